//! POSIX shell quoting.

/// Quotes a string for safe use as a single POSIX shell word.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// True for a portable shell variable name: `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names() {
        assert!(is_variable_name("VAULT_ADDR"));
        assert!(is_variable_name("_private1"));
        assert!(!is_variable_name(""));
        assert!(!is_variable_name("MY-VAR"));
        assert!(!is_variable_name("1ST"));
        assert!(!is_variable_name("X=1; touch /tmp/x; Y"));
    }

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("/etc/vault.d/vault.hcl"), "'/etc/vault.d/vault.hcl'");
    }

    #[test]
    fn test_quote_embedded_single_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_quote_empty() {
        assert_eq!(quote(""), "''");
    }
}
