use serde::de::DeserializeOwned;
use std::fmt;
use std::error::Error;

/// Format a float without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// JSON decode failure with the path of the offending field.
#[derive(Debug)]
pub struct DecodeError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at `{}`: {}", self.path, self.message)
    }
}

impl Error for DecodeError {}

/// Decode JSON, reporting where in the document decoding failed.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(de).map_err(|e| DecodeError {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug)]
    struct Outer {
        #[allow(dead_code)]
        inner: Inner,
    }

    #[derive(serde::Deserialize, Debug)]
    struct Inner {
        #[allow(dead_code)]
        value: u32,
    }

    #[test]
    fn formats_whole_and_fractional_numbers() {
        assert_eq!(format_number(212.0), "212");
        assert_eq!(format_number(-40.0), "-40");
        assert_eq!(format_number(71.5), "71.5");
    }

    #[test]
    fn decode_error_reports_path() {
        let err = decode_json::<Outer>(br#"{"inner":{"value":"x"}}"#).unwrap_err();
        assert_eq!(err.path, "inner.value");
    }
}
