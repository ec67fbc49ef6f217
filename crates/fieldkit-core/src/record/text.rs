//! Escaped, separator-joined text form used by value sets, lists and
//! record references.
//!
//! Fields are joined with a separator; backslash escapes the separator and
//! itself, and a field consisting of `\0` stands for a missing value.

pub const FIELD_SEPARATOR: char = ';';
pub const LIST_SEPARATOR: char = ',';

const ESCAPE: char = '\\';
const NULL_MARKER: char = '0';

/// Join fields, escaping each one. `None` becomes the null marker.
pub fn join<I>(fields: I, separator: char) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut out = String::new();

    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(separator);
        }
        match field {
            Some(text) => {
                for c in text.chars() {
                    if c == ESCAPE || c == separator {
                        out.push(ESCAPE);
                    }
                    out.push(c);
                }
            }
            None => {
                out.push(ESCAPE);
                out.push(NULL_MARKER);
            }
        }
    }

    out
}

/// Inverse of [`join`].
pub fn split(input: &str, separator: char) -> Result<Vec<Option<String>>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut null = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(NULL_MARKER) if current.is_empty() && !null => null = true,
                Some(NULL_MARKER) => return Err(format!("misplaced null marker in '{input}'")),
                Some(next) => current.push(next),
                None => return Err(format!("dangling escape character at the end of '{input}'")),
            }
        } else if c == separator {
            fields.push(finish_field(&mut current, &mut null, input)?);
        } else {
            current.push(c);
        }
    }
    fields.push(finish_field(&mut current, &mut null, input)?);

    Ok(fields)
}

fn finish_field(current: &mut String, null: &mut bool, input: &str) -> Result<Option<String>, String> {
    if *null {
        if !current.is_empty() {
            return Err(format!("null marker mixed with text in '{input}'"));
        }
        *null = false;
        return Ok(None);
    }

    Ok(Some(std::mem::take(current)))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{FIELD_SEPARATOR, join, split};

    #[test]
    fn escapes_separator_and_backslash() {
        let fields = vec![Some("a;b".to_string()), None, Some(r"c\d".to_string()), Some(String::new())];
        let text = join(fields.clone(), FIELD_SEPARATOR);
        assert_eq!(text, r"a\;b;\0;c\\d;");
        assert_eq!(split(&text, FIELD_SEPARATOR).expect("valid"), fields);
    }

    #[test]
    fn nested_joins_survive_round_trip() {
        let inner = join([Some("x;y".to_string()), None], FIELD_SEPARATOR);
        let outer = join([Some(inner.clone()), Some("z".to_string())], FIELD_SEPARATOR);

        let fields = split(&outer, FIELD_SEPARATOR).expect("valid");
        assert_eq!(fields[0].as_deref(), Some(inner.as_str()));
        assert_eq!(
            split(fields[0].as_deref().unwrap_or_default(), FIELD_SEPARATOR).expect("valid"),
            vec![Some("x;y".to_string()), None]
        );
    }

    #[test]
    fn malformed_escapes_are_rejected() {
        assert!(split(r"abc\", FIELD_SEPARATOR).is_err());
        assert!(split(r"a\0", FIELD_SEPARATOR).is_err());
        assert!(split(r"\0a", FIELD_SEPARATOR).is_err());
    }
}
