pub mod directives;
pub mod host;
