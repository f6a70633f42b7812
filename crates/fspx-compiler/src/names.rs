//! Extended process names: `Base` or `Base(1,2,...)`.

/// Builds the cache-name extension for an argument tuple: `(1,2)`, or the
/// empty string for a parameterless process.
pub fn name_extension(args: &[i64]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut out = String::from("(");
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&a.to_string());
    }
    out.push(')');
    out
}

/// Parses a user-supplied extended name into its base and argument list.
///
/// Exactly one balanced pair of parentheses is allowed; whitespace is only
/// tolerated after the closing parenthesis. Returns `None` on any malformed
/// input.
pub fn parse_extended_name(name: &str) -> Option<(String, Vec<i64>)> {
    let Some(open) = name.find('(') else {
        if name.contains(')') || name.contains(char::is_whitespace) || name.is_empty() {
            return None;
        }
        return Some((name.to_owned(), Vec::new()));
    };

    if open == 0 || name[open + 1..].contains('(') {
        return None;
    }
    let close = name.find(')')?;
    if name[close + 1..].contains(')') || open >= close {
        return None;
    }
    if name[..open].contains(char::is_whitespace) {
        return None;
    }
    if !name[close + 1..].chars().all(char::is_whitespace) {
        return None;
    }

    let base = name[..open].to_owned();
    let mut args = Vec::new();
    for part in name[open + 1..close].split(',') {
        args.push(part.trim().parse::<i64>().ok()?);
    }
    Some((base, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_shapes() {
        assert_eq!(name_extension(&[]), "");
        assert_eq!(name_extension(&[3]), "(3)");
        assert_eq!(name_extension(&[1, -2, 3]), "(1,-2,3)");
    }

    #[test]
    fn parses_plain_and_parameterized() {
        assert_eq!(parse_extended_name("P"), Some(("P".to_owned(), vec![])));
        assert_eq!(
            parse_extended_name("Buf(2,5)"),
            Some(("Buf".to_owned(), vec![2, 5]))
        );
        assert_eq!(
            parse_extended_name("Buf(2) "),
            Some(("Buf".to_owned(), vec![2]))
        );
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["P(", "P)", "(3)", "P((3))", "P(3))", "P (3)", "P(x)", "P(3) x", ""] {
            assert_eq!(parse_extended_name(bad), None, "{bad:?}");
        }
    }
}
