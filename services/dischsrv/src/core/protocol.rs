//! SCPI command set of the electronic load
//!
//! Builders for every command the controller sends, and tolerant parsers
//! for the replies. Parsers never panic; malformed input is a [`ParseError`].

use thiserror::Error;

use super::profile::StepType;

/// Instrument identification query
pub const IDN_QUERY: &str = "*IDN?";
/// Output state query
pub const INPUT_STATE_QUERY: &str = "INPut:STATe?";
/// Regulation function query
pub const FUNCTION_QUERY: &str = "INPut:FUNCtion?";

/// Unit suffixes the load may append to a measurement
const UNIT_SUFFIXES: [&str; 3] = ["V", "A", "W"];

/// Function codes reported by `INPut:FUNCtion?` (17 is unassigned)
pub const FUNCTION_CODES: [(i64, &str); 22] = [
    (0, "CC"),
    (1, "CV"),
    (2, "CR"),
    (3, "CP"),
    (4, "CCD"),
    (5, "ESR"),
    (6, "AUTO"),
    (7, "DISCHARGE"),
    (8, "CHARGE"),
    (9, "OCP"),
    (10, "CVD"),
    (11, "CRD"),
    (12, "MPPT"),
    (13, "CVCC"),
    (14, "CRCC"),
    (15, "CPCC"),
    (16, "CVCR"),
    (18, "CCDWAVE"),
    (19, "SWEEP"),
    (20, "OPP"),
    (21, "CPD"),
    (22, "SZ"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty response")]
    Empty,

    #[error("Invalid numeric response '{0}'")]
    InvalidNumber(String),

    #[error("Invalid input state response '{0}'")]
    InvalidState(String),
}

/// Measured quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Voltage,
    Current,
    Power,
}

impl Quantity {
    pub fn query(&self) -> &'static str {
        match self {
            Quantity::Voltage => "MEASure:VOLTage?",
            Quantity::Current => "MEASure:CURRent?",
            Quantity::Power => "MEASure:POWer?",
        }
    }
}

/// Stateless SCPI command builder and reply parser
pub struct CommandProtocol;

impl CommandProtocol {
    /// `INPut:STATe 1` / `INPut:STATe 0`
    pub fn input_state(enabled: bool) -> String {
        format!("INPut:STATe {}", u8::from(enabled))
    }

    /// `INPut:FUNCtion CC`
    pub fn function(step_type: StepType) -> String {
        format!("INPut:FUNCtion {step_type}")
    }

    /// `STATic:CC:HIGH:LEVel 10`
    pub fn level(step_type: StepType, value: f64) -> String {
        format!("STATic:{step_type}:HIGH:LEVel {value}")
    }

    pub fn measure(quantity: Quantity) -> &'static str {
        quantity.query()
    }

    /// Parse a numeric reply such as `399.87V`, `+1.2E+01` or `-0.5`
    ///
    /// One known unit suffix is stripped case-insensitively. The rest must
    /// be an optional sign, digits with at most one decimal point, and an
    /// optional exponent.
    pub fn parse_number(response: &str) -> Result<f64, ParseError> {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let upper = trimmed.to_ascii_uppercase();
        let body = UNIT_SUFFIXES
            .iter()
            .find_map(|unit| upper.strip_suffix(unit))
            .unwrap_or(&upper)
            .trim_end();

        if !is_numeric(body) {
            return Err(ParseError::InvalidNumber(response.to_string()));
        }
        body.parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber(response.to_string()))
    }

    /// Parse an `INPut:STATe?` reply
    pub fn parse_input_state(response: &str) -> Result<bool, ParseError> {
        match response.trim().to_ascii_uppercase().as_str() {
            "" => Err(ParseError::Empty),
            "1" | "ON" => Ok(true),
            "0" | "OFF" => Ok(false),
            _ => Err(ParseError::InvalidState(response.to_string())),
        }
    }

    /// Parse an `INPut:FUNCtion?` reply into a function name
    ///
    /// Numeric codes go through the code table; a mnemonic reply is passed
    /// through upper-cased.
    pub fn parse_function_code(response: &str) -> Result<String, ParseError> {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }
        if trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(trimmed.to_ascii_uppercase());
        }

        let value = Self::parse_number(trimmed)?;
        if value.fract() != 0.0 {
            return Err(ParseError::InvalidNumber(response.to_string()));
        }
        Ok(Self::function_name(value as i64))
    }

    /// Display name for a function code; unknown codes show as the number
    pub fn function_name(code: i64) -> String {
        FUNCTION_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| code.to_string())
    }
}

/// `[+-]? digits [. digits]? ([eE] [+-]? digits)?`, with at least one
/// mantissa digit
fn is_numeric(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let mut mantissa_digits = 0;
    let mut seen_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => mantissa_digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        i += 1;
    }
    if mantissa_digits == 0 {
        return false;
    }

    if i < bytes.len() && matches!(bytes[i], b'E' | b'e') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }

    i == bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builders() {
        assert_eq!(CommandProtocol::input_state(true), "INPut:STATe 1");
        assert_eq!(CommandProtocol::input_state(false), "INPut:STATe 0");
        assert_eq!(CommandProtocol::function(StepType::CP), "INPut:FUNCtion CP");
        assert_eq!(CommandProtocol::level(StepType::CC, 10.0), "STATic:CC:HIGH:LEVel 10");
        assert_eq!(CommandProtocol::level(StepType::CV, 0.5), "STATic:CV:HIGH:LEVel 0.5");
        assert_eq!(CommandProtocol::measure(Quantity::Power), "MEASure:POWer?");
    }

    #[test]
    fn test_parse_number_accepts_units_and_exponents() {
        assert_eq!(CommandProtocol::parse_number("399.87V").unwrap(), 399.87);
        assert_eq!(CommandProtocol::parse_number(" 10.0a\r").unwrap(), 10.0);
        assert_eq!(CommandProtocol::parse_number("+1.2E+01").unwrap(), 12.0);
        assert_eq!(CommandProtocol::parse_number("-0.5 W").unwrap(), -0.5);
        assert_eq!(CommandProtocol::parse_number("5.").unwrap(), 5.0);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        for bad in ["abc", "1.2.3", "--1", "1e", "V", ".", "12V3", "1e5.0", "0x10"] {
            assert!(
                matches!(CommandProtocol::parse_number(bad), Err(ParseError::InvalidNumber(_))),
                "accepted {bad:?}"
            );
        }
        assert_eq!(CommandProtocol::parse_number("  "), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_input_state() {
        assert_eq!(CommandProtocol::parse_input_state("1"), Ok(true));
        assert_eq!(CommandProtocol::parse_input_state("on"), Ok(true));
        assert_eq!(CommandProtocol::parse_input_state("OFF"), Ok(false));
        assert!(CommandProtocol::parse_input_state("maybe").is_err());
    }

    #[test]
    fn test_function_codes() {
        assert_eq!(CommandProtocol::parse_function_code("0").unwrap(), "CC");
        assert_eq!(CommandProtocol::parse_function_code("3").unwrap(), "CP");
        assert_eq!(CommandProtocol::parse_function_code("22").unwrap(), "SZ");
        assert_eq!(CommandProtocol::parse_function_code("17").unwrap(), "17");
        assert_eq!(CommandProtocol::parse_function_code("cv").unwrap(), "CV");
        assert!(CommandProtocol::parse_function_code("1.5").is_err());
    }
}
