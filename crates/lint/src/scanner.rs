//! SQL scanner
//!
//! Masks comments, string literals and dollar-quoted bodies so that rules can
//! match keywords with plain regular expressions, then splits what is left into
//! statements. Masked bytes become spaces and newlines are kept, so every byte
//! offset and line number still points at the same place in the source.
//!
//! Dollar quotes are tracked as a stack of matched delimiter pairs. A body that
//! never closes, or tags that overlap, mask the rest of the file: the linter
//! then misses findings rather than inventing them.

/// A comment with its marker stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// 1-based line the comment starts on
    pub line: usize,
    pub text: String,
}

/// A top-level statement of masked text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based line of the first keyword
    pub line: usize,
    /// Masked text, trimmed, without the terminating semicolon
    pub text: String,
}

impl Statement {
    /// Statement text on one line, shortened for messages
    pub fn summary(&self) -> String {
        const MAX: usize = 60;
        let collapsed = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() <= MAX {
            collapsed
        } else {
            let cut: String = collapsed.chars().take(MAX).collect();
            format!("{}...", cut.trim_end())
        }
    }
}

/// Result of scanning one file
#[derive(Debug, Clone, Default)]
pub struct ScannedSql {
    pub masked: String,
    pub comments: Vec<Comment>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment(usize),
    Literal { backslash_escapes: bool },
    QuotedIdentifier,
    DollarBody,
}

/// Scan `sql` into masked text, comments and statements
pub fn scan(sql: &str) -> ScannedSql {
    let bytes = sql.as_bytes();
    let mut masked = Vec::with_capacity(bytes.len());
    let mut comments = Vec::new();
    let mut tags: Vec<String> = Vec::new();

    let mut state = State::Code;
    let mut line = 1;
    let mut comment_start = (0, 0);
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        match state {
            State::Code => match b {
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    comment_start = (line, i + 2);
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment(1);
                    comment_start = (line, i + 2);
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                b'\'' => {
                    state = State::Literal {
                        backslash_escapes: is_escape_string_prefix(bytes, i),
                    };
                    masked.push(b);
                }
                b'"' => {
                    state = State::QuotedIdentifier;
                    masked.push(b);
                }
                b'$' => {
                    if let Some(tag) = dollar_tag_at(bytes, i) {
                        masked.extend_from_slice(tag.as_bytes());
                        i += tag.len();
                        tags.push(tag);
                        state = State::DollarBody;
                        continue;
                    }
                    masked.push(b);
                }
                _ => masked.push(b),
            },
            State::LineComment => {
                if b == b'\n' {
                    push_comment(&mut comments, comment_start.0, &sql[comment_start.1..i]);
                    state = State::Code;
                    masked.push(b);
                } else {
                    masked.push(b' ');
                }
            }
            State::BlockComment(depth) => {
                if b == b'*' && next == Some(b'/') {
                    if depth == 1 {
                        push_comment(&mut comments, comment_start.0, &sql[comment_start.1..i]);
                        state = State::Code;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                if b == b'/' && next == Some(b'*') {
                    state = State::BlockComment(depth + 1);
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                masked.push(mask_byte(b));
            }
            State::Literal { backslash_escapes } => {
                if backslash_escapes && b == b'\\' && next.is_some() {
                    masked.push(b' ');
                    if let Some(n) = next {
                        masked.push(mask_byte(n));
                        if n == b'\n' {
                            line += 1;
                        }
                    }
                    i += 2;
                    continue;
                }
                if b == b'\'' {
                    if next == Some(b'\'') {
                        masked.extend_from_slice(b"  ");
                        i += 2;
                        continue;
                    }
                    state = State::Code;
                    masked.push(b);
                } else {
                    masked.push(mask_byte(b));
                }
            }
            State::QuotedIdentifier => {
                masked.push(b);
                if b == b'"' {
                    if next == Some(b'"') {
                        masked.push(b'"');
                        i += 2;
                        continue;
                    }
                    state = State::Code;
                }
            }
            State::DollarBody => {
                if b == b'$' {
                    if let Some(tag) = dollar_tag_at(bytes, i) {
                        let closes = tags.last().map(|top| *top == tag).unwrap_or(false);
                        i += tag.len();
                        if closes {
                            tags.pop();
                            if tags.is_empty() {
                                masked.extend_from_slice(tag.as_bytes());
                                state = State::Code;
                                continue;
                            }
                        } else {
                            tags.push(tag.clone());
                        }
                        masked.extend(std::iter::repeat(b' ').take(tag.len()));
                        continue;
                    }
                }
                masked.push(mask_byte(b));
            }
        }

        if b == b'\n' {
            line += 1;
        }
        i += 1;
    }

    if state == State::LineComment {
        push_comment(&mut comments, comment_start.0, &sql[comment_start.1..]);
    }

    // Only ASCII spaces replace bytes, and only whole characters are copied
    let masked = String::from_utf8_lossy(&masked).into_owned();
    let statements = split_statements(&masked);

    ScannedSql {
        masked,
        comments,
        statements,
    }
}

/// Split masked text on top-level semicolons
pub fn split_statements(masked: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut line = 1;
    let mut start_line = None;
    let mut current = String::new();
    let mut in_identifier = false;

    for c in masked.chars() {
        // Quoted identifiers are the only unmasked text that may hold `;`
        if c == '"' {
            in_identifier = !in_identifier;
        }
        if c == ';' && !in_identifier {
            if let Some(start) = start_line.take() {
                statements.push(Statement {
                    line: start,
                    text: current.trim().to_string(),
                });
            }
            current.clear();
            continue;
        }

        if start_line.is_none() && !c.is_whitespace() {
            start_line = Some(line);
        }
        if start_line.is_some() {
            current.push(c);
        }
        if c == '\n' {
            line += 1;
        }
    }

    if let Some(start) = start_line {
        statements.push(Statement {
            line: start,
            text: current.trim().to_string(),
        });
    }
    statements
}

fn push_comment(comments: &mut Vec<Comment>, line: usize, raw: &str) {
    let text = raw
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    comments.push(Comment { line, text });
}

fn mask_byte(b: u8) -> u8 {
    if b == b'\n' {
        b'\n'
    } else {
        b' '
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// `E'...'` enables backslash escapes
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    if quote == 0 || !matches!(bytes[quote - 1], b'E' | b'e') {
        return false;
    }
    quote < 2 || !is_ident_byte(bytes[quote - 2])
}

/// A `$$` or `$tag$` delimiter starting at `i`
fn dollar_tag_at(bytes: &[u8], i: usize) -> Option<String> {
    // `x$1$` is part of an identifier, `$1` a parameter
    if i > 0 && is_ident_byte(bytes[i - 1]) {
        return None;
    }

    let mut end = i + 1;
    if let Some(&first) = bytes.get(end) {
        if first.is_ascii_alphabetic() || first == b'_' || first >= 0x80 {
            end += 1;
            while let Some(&b) = bytes.get(end) {
                if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 {
                    end += 1;
                } else {
                    break;
                }
            }
        }
    }

    if bytes.get(end) == Some(&b'$') {
        std::str::from_utf8(&bytes[i..=end]).ok().map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_comments_and_keeps_lines() {
        let sql = "-- header BEGIN\nSELECT 1; /* block\nCOMMIT */ SELECT 2;\n";
        let scanned = scan(sql);

        assert_eq!(scanned.masked.len(), sql.len());
        assert_eq!(scanned.masked.lines().count(), sql.lines().count());
        assert!(!scanned.masked.contains("BEGIN"));
        assert!(!scanned.masked.contains("COMMIT"));

        assert_eq!(scanned.comments.len(), 2);
        assert_eq!(scanned.comments[0], Comment { line: 1, text: "header BEGIN".to_string() });
        assert_eq!(scanned.comments[1].line, 2);
        assert_eq!(scanned.comments[1].text, "block COMMIT");

        let lines: Vec<_> = scanned.statements.iter().map(|s| (s.line, s.text.as_str())).collect();
        assert_eq!(lines, vec![(2, "SELECT 1"), (3, "SELECT 2")]);
    }

    #[test]
    fn test_string_literals_are_masked() {
        let scanned = scan("INSERT INTO t VALUES ('a;b -- c', 'it''s; BEGIN');\nCOMMIT;");
        assert_eq!(scanned.statements.len(), 2);
        assert!(!scanned.statements[0].text.contains("BEGIN"));
        assert!(scanned.comments.is_empty());
        assert_eq!(scanned.statements[1].text, "COMMIT");
        assert_eq!(scanned.statements[1].line, 2);
    }

    #[test]
    fn test_escape_string_backslash() {
        let scanned = scan(r"SELECT E'a\'; BEGIN'; SELECT 2;");
        let texts: Vec<_> = scanned.statements.iter().map(|s| s.text.clone()).collect();
        assert_eq!(texts.len(), 2);
        assert!(!texts[0].contains("BEGIN"));
        assert_eq!(texts[1], "SELECT 2");
    }

    #[test]
    fn test_quoted_identifiers_are_kept() {
        let scanned = scan("DROP TABLE \"odd;name\";");
        assert_eq!(scanned.statements.len(), 1);
        assert_eq!(scanned.statements[0].text, "DROP TABLE \"odd;name\"");
    }

    #[test]
    fn test_dollar_bodies_are_masked() {
        let sql = "DO $$\nBEGIN\n  PERFORM 1;\nEND\n$$;\nBEGIN;\n";
        let scanned = scan(sql);
        assert_eq!(scanned.statements.len(), 2);
        assert_eq!(scanned.statements[0].line, 1);
        assert!(scanned.statements[0].text.starts_with("DO $$"));
        assert!(!scanned.statements[0].text.contains("PERFORM"));
        assert_eq!(scanned.statements[1], Statement { line: 6, text: "BEGIN".to_string() });
    }

    #[test]
    fn test_nested_dollar_tags() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $fn$\nBEGIN\n  EXECUTE $q$ COMMIT; $q$;\nEND\n$fn$ LANGUAGE plpgsql;\nSELECT 1;";
        let scanned = scan(sql);
        assert_eq!(scanned.statements.len(), 2);
        assert!(scanned.statements[0].text.ends_with("$fn$ LANGUAGE plpgsql"));
        assert_eq!(scanned.statements[1].line, 6);
    }

    #[test]
    fn test_unterminated_dollar_body_masks_rest() {
        let scanned = scan("DO $$ BEGIN;\nCOMMIT;\n");
        assert_eq!(scanned.statements.len(), 1);
        assert!(!scanned.masked.contains("COMMIT"));
    }

    #[test]
    fn test_positional_parameters_are_not_tags() {
        let scanned = scan("PREPARE p AS SELECT $1; COMMIT;");
        assert_eq!(scanned.statements.len(), 2);
        assert_eq!(scanned.statements[1].text, "COMMIT");
    }

    #[test]
    fn test_statement_summary() {
        let statement = Statement {
            line: 1,
            text: "CREATE   TABLE\n  t (id int)".to_string(),
        };
        assert_eq!(statement.summary(), "CREATE TABLE t (id int)");

        let long = Statement {
            line: 1,
            text: format!("SELECT {}", "x, ".repeat(40)),
        };
        assert!(long.summary().ends_with("..."));
    }
}
