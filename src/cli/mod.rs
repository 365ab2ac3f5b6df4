pub mod args;

use clap::Parser;
pub use args::{Arguments, Reporter};

pub fn parse() -> Arguments {
    Arguments::parse()
}
