// All files containing tests
mod common;

mod formats;
mod quirks;
mod validation;
