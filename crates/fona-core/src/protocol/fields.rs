//! Reply field helpers
//!
//! AT replies are comma separated, with string fields wrapped in double quotes.
//! Quoted fields may themselves contain commas (timestamps such as
//! `"24/03/01,12:30:00+04"`), so splitting has to track quoting.

use std::str::FromStr;

use super::ProtocolError;

/// Split a reply payload on commas that are not inside double quotes.
/// Fields are trimmed of surrounding whitespace but keep their quotes.
pub fn split_fields(payload: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in payload.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(payload[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(payload[start..].trim());
    fields
}

/// Remove one matching pair of surrounding quotes (single or double), if present.
pub fn unquote(field: &str) -> &str {
    let field = field.trim();
    let Some(first) = field.chars().next() else {
        return field;
    };
    if first != '"' && first != '\'' {
        return field;
    }
    if field.len() < 2 || !field.ends_with(first) {
        return field;
    }
    &field[1..field.len() - 1]
}

/// Parse a numeric field, reporting which command's reply was malformed.
pub fn parse_number<T: FromStr>(command: &str, field: &str) -> Result<T, ProtocolError> {
    unquote(field)
        .parse::<T>()
        .map_err(|_| ProtocolError::malformed(command, format!("'{}' is not a number", field)))
}

/// Fetch field `index` or fail with a `MalformedReply` naming the command.
pub fn field<'a>(command: &str, fields: &[&'a str], index: usize) -> Result<&'a str, ProtocolError> {
    fields.get(index).copied().ok_or_else(|| {
        ProtocolError::malformed(
            command,
            format!("expected at least {} fields, got {}", index + 1, fields.len()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_plain() {
        assert_eq!(split_fields("0,1,\"00C1\",\"1234\""), vec!["0", "1", "\"00C1\"", "\"1234\""]);
    }

    #[test]
    fn test_split_keeps_quoted_commas() {
        let fields = split_fields("3,\"REC READ\",\"+12025550123\",\"\",\"24/03/01,12:30:00+04\",145,5");
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[4], "\"24/03/01,12:30:00+04\"");
        assert_eq!(fields[6], "5");
    }

    #[test]
    fn test_split_empty_payload() {
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"SM\""), "SM");
        assert_eq!(unquote(" 'x' "), "x");
        assert_eq!(unquote("145"), "145");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("\"open"), "\"open");
        assert_eq!(unquote(""), "");
    }

    #[test]
    fn test_parse_number_errors_name_command() {
        let err = parse_number::<u32>("AT+CSQ", "abc").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedReply { ref command, .. } if command == "AT+CSQ"));
        assert_eq!(parse_number::<u32>("AT+CSQ", "\"17\"").unwrap(), 17);
    }

    #[test]
    fn test_field_out_of_range() {
        let fields = split_fields("1");
        assert!(field("AT+CREG?", &fields, 1).is_err());
        assert_eq!(field("AT+CREG?", &fields, 0).unwrap(), "1");
    }
}
