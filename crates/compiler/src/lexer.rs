//! Tokenizer for Quill source lines.
//!
//! `tokenize` is total: anything it cannot classify becomes an
//! [`TokenKind::Invalid`] token that the parser reports.

use quill_common::{Token, TokenKind};

/// Two-character operators, matched before their one-character prefixes.
const DOUBLE_SYMBOLS: [&str; 6] = ["==", "<=", ">=", "!=", "++", "--"];

const SINGLE_SYMBOLS: &str = "=<>+-*/\\()[],.!";

/// One logical line after comment stripping and `_` continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based number of the first physical line.
    pub line: usize,
    pub text: String,
}

/// Split source text into logical lines.
///
/// Comments are removed, blank lines dropped, and a line whose trimmed
/// content ends in `_` is joined with the next one, unless that `_` sits
/// inside an unterminated string literal.
pub fn logical_lines(source: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut pending: Option<SourceLine> = None;

    for (idx, raw) in source.lines().enumerate() {
        let text = strip_comment(raw).trim();
        let continues = text.ends_with('_') && !ends_inside_string(text);
        let body = if continues {
            &text[..text.len() - 1]
        } else {
            text
        };

        let current = match pending.take() {
            Some(mut joined) => {
                joined.text.push(' ');
                joined.text.push_str(body);
                joined
            }
            None => SourceLine {
                line: idx + 1,
                text: body.to_string(),
            },
        };

        if continues {
            pending = Some(current);
        } else if !current.text.trim().is_empty() {
            lines.push(current);
        }
    }

    if let Some(last) = pending {
        if !last.text.trim().is_empty() {
            lines.push(last);
        }
    }

    lines
}

/// Remove a trailing `#` comment that is not inside a string literal.
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (pos, ch) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '\'' {
                in_string = false;
            }
        } else if ch == '\'' {
            in_string = true;
        } else if ch == '#' {
            return &line[..pos];
        }
    }
    line
}

fn ends_inside_string(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
        } else if in_string && ch == '\\' {
            escaped = true;
        } else if ch == '\'' {
            in_string = !in_string;
        }
    }
    in_string
}

/// Split one line into classified tokens.
pub fn tokenize(line: &str) -> Vec<Token> {
    let line = strip_comment(line);
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        let start = pos;

        if ch.is_whitespace() {
            while pos < chars.len() && chars[pos].is_whitespace() {
                pos += 1;
            }
            tokens.push(Token::new(collect(&chars[start..pos]), TokenKind::Blank));
        } else if ch == '\'' {
            let (token, next) = read_string(&chars, pos);
            tokens.push(token);
            pos = next;
        } else if ch.is_ascii_digit() {
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            tokens.push(Token::new(
                collect(&chars[start..pos]),
                TokenKind::NumberLiteral,
            ));
        } else if ch.is_alphabetic() || ch == '_' {
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::identifier(collect(&chars[start..pos])));
        } else if let Some(op) = double_symbol(&chars, pos) {
            tokens.push(Token::symbol(op));
            pos += 2;
        } else if SINGLE_SYMBOLS.contains(ch) {
            tokens.push(Token::symbol(ch.to_string()));
            pos += 1;
        } else {
            tokens.push(Token::new(ch.to_string(), TokenKind::Invalid));
            pos += 1;
        }
    }

    let mut tokens = merge_decimals(tokens);
    while tokens.last().is_some_and(Token::is_blank) {
        tokens.pop();
    }
    let leading = tokens.iter().take_while(|t| t.is_blank()).count();
    tokens.drain(..leading);
    tokens
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn double_symbol(chars: &[char], pos: usize) -> Option<&'static str> {
    let pair: String = chars.get(pos..pos + 2)?.iter().collect();
    DOUBLE_SYMBOLS.iter().copied().find(|op| *op == pair)
}

/// Read a single-quoted literal starting at `start`. Returns the token and
/// the position after it. An unterminated literal becomes `Invalid`.
fn read_string(chars: &[char], start: usize) -> (Token, usize) {
    let mut text = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '\'' => return (Token::new(text, TokenKind::StringLiteral), pos + 1),
            '\\' if pos + 1 < chars.len() => {
                text.push(match chars[pos + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                pos += 2;
            }
            other => {
                text.push(other);
                pos += 1;
            }
        }
    }
    (
        Token::new(collect(&chars[start..]), TokenKind::Invalid),
        chars.len(),
    )
}

/// Join `int . int` into one decimal literal. A dot next to anything else
/// stays a member-access symbol.
fn merge_decimals(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        let left_is_int = out
            .last()
            .is_some_and(|t| t.kind == TokenKind::NumberLiteral && !t.text.contains('.'));
        let right_is_int = iter
            .peek()
            .is_some_and(|t| t.kind == TokenKind::NumberLiteral);
        if token.is_symbol(".") && left_is_int && right_is_int {
            if let (Some(left), Some(right)) = (out.last_mut(), iter.next()) {
                left.text.push('.');
                left.text.push_str(&right.text);
            }
            continue;
        }
        out.push(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<(String, TokenKind)> {
        tokenize(line)
            .into_iter()
            .filter(|t| !t.is_blank())
            .map(|t| (t.text, t.kind))
            .collect()
    }

    fn texts(line: &str) -> Vec<String> {
        kinds(line).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn empty_line() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn comment_only() {
        assert!(tokenize("# nothing here").is_empty());
    }

    #[test]
    fn trailing_comment_stripped() {
        assert_eq!(texts("a = 1 # set a"), vec!["a", "=", "1"]);
    }

    #[test]
    fn hash_inside_string_is_not_a_comment() {
        assert_eq!(
            kinds("print('#1')"),
            vec![
                ("print".into(), TokenKind::Identifier),
                ("(".into(), TokenKind::Symbol),
                ("#1".into(), TokenKind::StringLiteral),
                (")".into(), TokenKind::Symbol),
            ]
        );
    }

    #[test]
    fn blanks_between_tokens_are_kept() {
        let tokens = tokenize("  a  +b ");
        assert_eq!(tokens.len(), 4);
        assert!(tokens[1].is_blank());
        assert!(!tokens[0].is_blank());
        assert!(!tokens[3].is_blank());
    }

    #[test]
    fn escaped_quote_does_not_terminate() {
        assert_eq!(
            kinds(r"'it\'s'"),
            vec![("it's".into(), TokenKind::StringLiteral)]
        );
    }

    #[test]
    fn newline_escape() {
        assert_eq!(kinds(r"'a\nb'"), vec![("a\nb".into(), TokenKind::StringLiteral)]);
    }

    #[test]
    fn unterminated_string_is_invalid() {
        assert_eq!(kinds("'abc"), vec![("'abc".into(), TokenKind::Invalid)]);
    }

    #[test]
    fn decimal_merge() {
        assert_eq!(kinds("3.14"), vec![("3.14".into(), TokenKind::NumberLiteral)]);
    }

    #[test]
    fn dot_after_identifier_stays_symbol() {
        assert_eq!(texts("a.size()"), vec!["a", ".", "size", "(", ")"]);
    }

    #[test]
    fn dot_with_blanks_does_not_merge() {
        assert_eq!(texts("1 . 2"), vec!["1", ".", "2"]);
    }

    #[test]
    fn decimal_followed_by_method() {
        assert_eq!(texts("1.5.floor()"), vec!["1.5", ".", "floor", "(", ")"]);
    }

    #[test]
    fn double_symbols_are_greedy() {
        assert_eq!(
            texts("a==b<=c>=d!=e++ --"),
            vec!["a", "==", "b", "<=", "c", ">=", "d", "!=", "e", "++", "--"]
        );
    }

    #[test]
    fn backslash_is_a_symbol() {
        assert_eq!(texts(r"7 \ 2"), vec!["7", "\\", "2"]);
    }

    #[test]
    fn unknown_character_is_invalid() {
        assert_eq!(kinds("a $ b")[1], ("$".into(), TokenKind::Invalid));
    }

    #[test]
    fn logical_lines_skip_blank_and_comment_lines() {
        let lines = logical_lines("a = 1\n\n# note\nb = 2\n");
        assert_eq!(
            lines,
            vec![
                SourceLine {
                    line: 1,
                    text: "a = 1".into()
                },
                SourceLine {
                    line: 4,
                    text: "b = 2".into()
                },
            ]
        );
    }

    #[test]
    fn continuation_joins_lines() {
        let lines = logical_lines("a = 1 + _\n  2\nb = 3");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, 1);
        assert_eq!(texts(&lines[0].text), vec!["a", "=", "1", "+", "2"]);
        assert_eq!(lines[1].line, 3);
    }

    #[test]
    fn underscore_inside_open_string_is_not_continuation() {
        let lines = logical_lines("a = 'x _\nb = 2");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a = 'x _");
    }

    #[test]
    fn underscore_after_closed_string_continues() {
        let lines = logical_lines("print('x', _\n 1)");
        assert_eq!(lines.len(), 1);
    }
}
