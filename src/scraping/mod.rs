// Web scraping module for extracting page fragments
// Plain HTTP fetch + CSS selector; no browser automation

pub mod snippet;

pub use snippet::{extract_snippet, fetch_page, Snippet};
