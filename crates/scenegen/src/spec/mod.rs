mod parser;
mod types;

pub use parser::{
    parse_game_spec, ParsedSpec, SectionFault, SourceLocation, SpecParseError,
    MAX_CONTAINER_ITEMS, MAX_INPUT_CHARS,
};
pub use types::*;
