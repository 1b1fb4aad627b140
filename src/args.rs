//! Loosely-typed call boundary.
//!
//! Bindings hand over positional argument lists; these are validated here,
//! synchronously, into typed requests before any work is queued. Decode
//! failures never surface here, only shape errors.

use std::path::PathBuf;

use bytes::Bytes;

use crate::bridge::Callback;
use crate::error::ArgumentError;
use crate::ingest::ReadRequest;
use crate::source::ImageSource;
use crate::types::ReadMode;

const READ_IMAGE: &str = "readImage";
const READ_IMAGE_MULTI: &str = "readImageMulti";

/// One positional argument as a binding sees it.
pub enum Arg<T> {
    Str(String),
    Buffer(Bytes),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Callback(Callback<T>),
}

impl<T> Arg<T> {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(crate::error::Result<T>) + Send + 'static,
    {
        Arg::Callback(Box::new(f))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Arg::Str(_) => "string",
            Arg::Buffer(_) => "Buffer",
            Arg::Int(_) => "integer",
            Arg::Float(_) => "number",
            Arg::Bool(_) => "boolean",
            Arg::Null => "null",
            Arg::Callback(_) => "Function",
        }
    }
}

impl<T> std::fmt::Debug for Arg<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "Str({s:?})"),
            Arg::Buffer(b) => write!(f, "Buffer({} bytes)", b.len()),
            Arg::Int(i) => write!(f, "Int({i})"),
            Arg::Float(x) => write!(f, "Float({x})"),
            Arg::Bool(b) => write!(f, "Bool({b})"),
            other => f.write_str(other.type_name()),
        }
    }
}

impl<T> From<&str> for Arg<T> {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_owned())
    }
}

impl<T> From<Vec<u8>> for Arg<T> {
    fn from(bytes: Vec<u8>) -> Self {
        Arg::Buffer(Bytes::from(bytes))
    }
}

impl<T> From<i64> for Arg<T> {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

/// A validated call: what to read, and where to deliver the result.
/// Without a callback the caller gets a future instead.
pub struct Invocation<T> {
    pub request: ReadRequest,
    pub callback: Option<Callback<T>>,
}

/// `readImage(pathOrBuffer, [mode], [callback])`
pub fn parse_read_image<T>(args: Vec<Arg<T>>) -> Result<Invocation<T>, ArgumentError> {
    parse(READ_IMAGE, args, |first| match first {
        Arg::Str(path) => Ok(ImageSource::Path(PathBuf::from(path))),
        Arg::Buffer(bytes) => Ok(ImageSource::Buffer(bytes)),
        _ => Err("a string or a Buffer"),
    })
}

/// `readImageMulti(path, [mode], [callback])`
pub fn parse_read_multi<T>(args: Vec<Arg<T>>) -> Result<Invocation<T>, ArgumentError> {
    parse(READ_IMAGE_MULTI, args, |first| match first {
        Arg::Str(path) => Ok(ImageSource::Path(PathBuf::from(path))),
        _ => Err("a string"),
    })
}

fn parse<T>(
    function: &'static str,
    args: Vec<Arg<T>>,
    source: impl FnOnce(Arg<T>) -> Result<ImageSource, &'static str>,
) -> Result<Invocation<T>, ArgumentError> {
    const MAX: usize = 3;

    if args.is_empty() {
        return Err(ArgumentError::TooFewArguments { function, min: 1 });
    }
    if args.len() > MAX {
        return Err(ArgumentError::TooManyArguments { function, max: MAX });
    }

    let mut args = args.into_iter();
    let first = args.next().ok_or(ArgumentError::TooFewArguments { function, min: 1 })?;
    let source = source(first).map_err(|expected| ArgumentError::InvalidType {
        position: 1,
        expected,
    })?;

    let mut request = ReadRequest::new(source);
    let mut position = 2;
    let mut next = args.next();

    if let Some(Arg::Int(flag)) = next {
        let mode = ReadMode::from_flag(flag).ok_or(ArgumentError::UnknownReadMode(flag))?;
        request = request.with_mode(mode);
        position += 1;
        next = args.next();
    }

    let callback = match next {
        None => None,
        Some(Arg::Callback(f)) => Some(f),
        Some(_) => {
            return Err(ArgumentError::InvalidType {
                position,
                expected: "a Function",
            });
        }
    };

    if args.next().is_some() {
        return Err(ArgumentError::TooManyArguments {
            function,
            max: position,
        });
    }

    Ok(Invocation { request, callback })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecodedImage;

    type Args = Vec<Arg<DecodedImage>>;

    #[test]
    fn test_mode_then_callback() {
        let args: Args = vec!["a.png".into(), Arg::Int(0), Arg::callback(|_| {})];
        let call = parse_read_image(args).unwrap();
        assert_eq!(call.request.mode(), Some(ReadMode::Grayscale));
        assert!(call.callback.is_some());
    }

    #[test]
    fn test_float_mode_is_not_a_mode() {
        let args: Args = vec!["a.png".into(), Arg::Float(0.5)];
        let err = parse_read_image(args).err().unwrap();
        assert_eq!(err.to_string(), "Argument 2 must be a Function");
    }

    #[test]
    fn test_callback_position_after_mode() {
        let args: Args = vec!["a.png".into(), Arg::Int(1), Arg::Bool(true)];
        let err = parse_read_image(args).err().unwrap();
        assert_eq!(err.to_string(), "Argument 3 must be a Function");
    }

    #[test]
    fn test_argument_after_callback_rejected() {
        let args: Args = vec!["a.png".into(), Arg::callback(|_| {}), Arg::Null];
        let err = parse_read_image(args).err().unwrap();
        assert!(matches!(err, ArgumentError::TooManyArguments { max: 2, .. }));
    }

    #[test]
    fn test_unknown_flag() {
        let args: Args = vec!["a.png".into(), Arg::Int(3)];
        let err = parse_read_image(args).err().unwrap();
        assert_eq!(err, ArgumentError::UnknownReadMode(3));
    }
}
