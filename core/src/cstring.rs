/// Recovers the contents of a C string literal from its source text.
///
/// Adjacent literals are concatenated and escape sequences are kept as written. Returns `None`
/// unless the source consists of at least one literal separated only by whitespace.
pub fn extract_c_string(source: &str) -> Option<String> {
    let mut contents = String::new();
    let mut in_quotes = false;
    let mut prev_was_escape = false;
    let mut literals = 0usize;

    for c in source.chars() {
        if c == '"' && !prev_was_escape {
            in_quotes = !in_quotes;
            if in_quotes {
                literals += 1;
            }
        } else if in_quotes {
            contents.push(c);
            prev_was_escape = c == '\\' && !prev_was_escape;
        } else if !c.is_whitespace() {
            return None;
        }
    }

    (!in_quotes && literals > 0).then_some(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_simple_strings() {
        assert_eq!(
            extract_c_string(r#" "This is a simple line" "#).as_deref(),
            Some("This is a simple line")
        );
        assert_eq!(
            extract_c_string(r#"" \"Escaped quotes!\" Noooo!!!""#).as_deref(),
            Some(r#" \"Escaped quotes!\" Noooo!!!"#)
        );
        assert_eq!(
            extract_c_string(r#""\\n Escaped new line""#).as_deref(),
            Some(r"\\n Escaped new line")
        );
        assert_eq!(
            extract_c_string(r#""Format specifiers %s %d '#(*&(*79234'""#).as_deref(),
            Some("Format specifiers %s %d '#(*&(*79234'")
        );
        assert_eq!(extract_c_string(r#""""#).as_deref(), Some(""));
    }

    #[test]
    fn escaped_backslash_closes_literal() {
        assert_eq!(extract_c_string(r#""dir\\" "name""#).as_deref(), Some(r"dir\\name"));
    }

    #[test]
    fn concatenate_adjacent_literals() {
        assert_eq!(
            extract_c_string("    \" This is the real string \"\r\n \"and it's separated \"").as_deref(),
            Some(" This is the real string and it's separated ")
        );
        assert_eq!(extract_c_string("\r\n\r\n\r\n \"Weird\"\r\n\r\n ").as_deref(), Some("Weird"));

        let source = "\n\"This is a string\"\n\n    \" that's a bit\" \" more\"\n            \" representative\\r\\n\"\n\n";
        assert_eq!(
            extract_c_string(source).as_deref(),
            Some(r"This is a string that's a bit more representative\r\n")
        );
    }

    #[test]
    fn reject_malformed_strings() {
        assert_eq!(extract_c_string("\""), None);
        assert_eq!(extract_c_string(r#"" One good string" But another bad"#), None);
        assert_eq!(extract_c_string(r#"" One"   " and a half good strings"#), None);
        assert_eq!(extract_c_string(r#" "Test" extraneous chars"#), None);
        assert_eq!(extract_c_string("\r\n\r\n\r\n \"Extra quote there =>\"\r\n\r\n \""), None);
    }

    #[test]
    fn reject_non_literals() {
        assert_eq!(extract_c_string(" fmt"), None);
        assert_eq!(extract_c_string("   "), None);
        assert_eq!(extract_c_string(""), None);
    }
}
