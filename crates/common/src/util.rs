// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// Split a command string into words. Double quotes group words, backslash
/// escapes the next character. Unterminated quotes run to end of string.
#[must_use]
pub fn parse_into_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars();
    let mut has_content = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    has_content = true;
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                has_content = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_content {
                    words.push(std::mem::take(&mut current));
                    has_content = false;
                }
            }
            c => {
                current.push(c);
                has_content = true;
            }
        }
    }
    if has_content {
        words.push(current);
    }
    words
}

/// Whether `s` is a valid script-visible identifier: `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_into_words_simple() {
        assert_eq!(parse_into_words("hello world"), vec!["hello", "world"]);
    }

    #[test]
    fn test_parse_into_words_quotes() {
        assert_eq!(
            parse_into_words("take \"the wooden staff\""),
            vec!["take", "the wooden staff"]
        );
    }

    #[test]
    fn test_parse_into_words_escape() {
        assert_eq!(parse_into_words(r"one\ word two"), vec!["one word", "two"]);
    }

    #[test]
    fn test_parse_into_words_empty_quotes() {
        assert_eq!(parse_into_words("say \"\""), vec!["say", ""]);
    }

    #[test]
    fn test_parse_into_words_collapses_whitespace() {
        assert_eq!(parse_into_words("  a   b  "), vec!["a", "b"]);
    }

    #[test]
    fn test_is_valid_ident() {
        assert!(is_valid_ident("foo"));
        assert!(is_valid_ident("_x9"));
        assert!(!is_valid_ident("9x"));
        assert!(!is_valid_ident(""));
        assert!(!is_valid_ident("has space"));
        assert!(!is_valid_ident("dash-ed"));
    }
}
