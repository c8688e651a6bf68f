pub mod format;

#[cfg(test)]
mod tests;
