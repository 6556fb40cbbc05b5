use thiserror::Error;

use crate::{
    backend::{runtime::RuntimeError, slot::SlotAbiError},
    middle::il::{parse::ParseError, verify::VerifyError},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("slot ABI: {0}")]
    SlotAbi(#[from] SlotAbiError),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::il::parse::parse_module;

    fn parse(text: &str) -> Result<()> {
        parse_module(text)?;
        Ok(())
    }

    #[test]
    fn parse_errors_convert() {
        let error = parse("func main() -> i64 {\nentry:\n  %0 = bogus i64 1\n}\n").unwrap_err();

        assert!(matches!(error, Error::Parse(ParseError { line: 3, .. })));
        assert!(error.to_string().starts_with("parse error: line 3:"));
    }
}
