//! Helpers shared by the command line binaries.

use std::error::Error;
use std::fmt;

/// A static one-line message usable as a boxed error on the CLI surface.
#[derive(Debug)]
pub struct CliErr(pub &'static str);

impl fmt::Display for CliErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for CliErr {}
