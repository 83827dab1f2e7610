//! Splitting of migration scripts into individually executable statements.

/// Split SQL into individual statements.
///
/// Semicolons only terminate a statement when they appear in code: quoted
/// strings and identifiers, `--` and `/* */` comments, dollar-quoted bodies
/// (`$$ ... $$`, `$tag$ ... $tag$`) and `CREATE TRIGGER ... BEGIN ... END`
/// blocks are kept intact. Fragments holding only whitespace or comments are
/// dropped. Returned statements carry no trailing semicolon.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut splitter = Splitter::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '-' if next == Some('-') => {
                splitter.end_word();
                while i < chars.len() && chars[i] != '\n' {
                    splitter.current.push(chars[i]);
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                splitter.end_word();
                splitter.current.push_str("/*");
                i += 2;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        splitter.current.push_str("*/");
                        i += 2;
                        break;
                    }
                    splitter.current.push(chars[i]);
                    i += 1;
                }
            }
            '\'' | '"' | '`' => {
                // E'...' strings allow backslash escapes.
                let backslash_escapes = c == '\'' && splitter.word.eq_ignore_ascii_case("e");
                splitter.end_word();
                splitter.has_code = true;
                splitter.current.push(c);
                i += 1;
                while i < chars.len() {
                    let q = chars[i];
                    splitter.current.push(q);
                    i += 1;
                    if backslash_escapes && q == '\\' {
                        if let Some(&escaped) = chars.get(i) {
                            splitter.current.push(escaped);
                            i += 1;
                        }
                        continue;
                    }
                    if q == c {
                        // A doubled quote is an escaped quote, not the end.
                        if chars.get(i) == Some(&c) {
                            splitter.current.push(c);
                            i += 1;
                            continue;
                        }
                        break;
                    }
                }
            }
            '$' => {
                splitter.end_word();
                splitter.has_code = true;
                match dollar_tag_at(&chars, i) {
                    Some(tag_len) => {
                        let tag = &chars[i..i + tag_len];
                        splitter.current.extend(tag);
                        i += tag_len;
                        while i < chars.len() {
                            if chars[i..].starts_with(tag) {
                                splitter.current.extend(tag);
                                i += tag_len;
                                break;
                            }
                            splitter.current.push(chars[i]);
                            i += 1;
                        }
                    }
                    None => {
                        splitter.current.push(c);
                        i += 1;
                    }
                }
            }
            ';' => {
                splitter.end_word();
                if splitter.in_block() {
                    splitter.current.push(c);
                } else {
                    splitter.finish_statement();
                }
                i += 1;
            }
            _ => {
                if c.is_alphanumeric() || c == '_' {
                    splitter.word.push(c);
                } else {
                    splitter.end_word();
                }
                if !c.is_whitespace() {
                    splitter.has_code = true;
                }
                splitter.current.push(c);
                i += 1;
            }
        }
    }

    splitter.end_word();
    splitter.finish_statement();
    splitter.statements
}

/// Length of the dollar-quote tag starting at `start`, if any.
///
/// Accepts `$$` and `$ident$` where the identifier does not start with a
/// digit, so positional parameters like `$1` are not mistaken for tags.
fn dollar_tag_at(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    match chars.get(j) {
        Some('$') => return Some(2),
        Some(c) if c.is_alphabetic() || *c == '_' => {}
        _ => return None,
    }
    while let Some(c) = chars.get(j) {
        if *c == '$' {
            return Some(j - start + 1);
        }
        if !(c.is_alphanumeric() || *c == '_') {
            return None;
        }
        j += 1;
    }
    None
}

#[derive(Default)]
struct Splitter {
    statements: Vec<String>,
    current: String,
    /// Whether `current` holds anything besides whitespace and comments.
    has_code: bool,
    word: String,
    /// Upper-cased code words of the current statement.
    words: Vec<String>,
}

impl Splitter {
    fn end_word(&mut self) {
        if !self.word.is_empty() {
            self.words.push(self.word.to_uppercase());
            self.word.clear();
        }
    }

    /// Whether the current statement is an unfinished `BEGIN ... END` body
    /// (triggers, SQL-standard function bodies).
    fn in_block(&self) -> bool {
        let is_routine = self.words.first().map(String::as_str) == Some("CREATE")
            && self
                .words
                .iter()
                .any(|w| matches!(w.as_str(), "TRIGGER" | "FUNCTION" | "PROCEDURE"));
        if !is_routine {
            return false;
        }

        let mut depth = 0i32;
        let mut opened = false;
        for word in &self.words {
            match word.as_str() {
                "BEGIN" => {
                    depth += 1;
                    opened = true;
                }
                "CASE" if opened => depth += 1,
                "END" if opened => depth -= 1,
                _ => {}
            }
        }
        opened && depth > 0
    }

    fn finish_statement(&mut self) {
        if self.has_code {
            self.statements.push(self.current.trim().to_string());
        }
        self.current.clear();
        self.words.clear();
        self.has_code = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_statements() {
        let sql = "SELECT 1; SELECT 2; SELECT 3;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_last_statement_without_semicolon() {
        let stmts = split_sql_statements("CREATE TABLE a (id INT);\nCREATE TABLE b (id INT)");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "CREATE TABLE b (id INT)");
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert!(stmts[1].contains("SELECT 3"));
    }

    #[test]
    fn test_split_with_tagged_dollar_quote() {
        let sql = "DO $body$ BEGIN RAISE NOTICE 'a;b'; END $body$; SELECT $1::int;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("$body$"));
        assert_eq!(stmts[1], "SELECT $1::int");
    }

    #[test]
    fn test_semicolons_in_strings_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b', 'it''s; fine');\n\
                   -- comment; with semicolon\n\
                   /* block; comment */ INSERT INTO \"odd;name\" VALUES (1);";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b', 'it''s; fine')");
        assert!(stmts[1].ends_with("INSERT INTO \"odd;name\" VALUES (1)"));
    }

    #[test]
    fn test_escape_string_backslash_quote() {
        let sql = "INSERT INTO t VALUES (E'it\\'s; here'); SELECT 1;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts, vec!["INSERT INTO t VALUES (E'it\\'s; here')", "SELECT 1"]);

        // Outside E'' strings a backslash is an ordinary character.
        let stmts = split_sql_statements("SELECT 'a\\'; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 'a\\'", "SELECT 2"]);
    }

    #[test]
    fn test_comment_only_script_is_empty() {
        let sql = "-- nothing to do here;\n/* really; nothing */\n  ;\n";
        assert!(split_sql_statements(sql).is_empty());
        assert!(split_sql_statements("").is_empty());
    }

    #[test]
    fn test_sqlite_trigger_body_kept_whole() {
        let sql = r#"
CREATE TRIGGER orders_audit AFTER UPDATE ON orders
BEGIN
    INSERT INTO audit (id, state) VALUES (NEW.id, CASE WHEN NEW.paid THEN 'paid' ELSE 'open' END);
    UPDATE orders SET touched = 1 WHERE id = NEW.id;
END;
CREATE INDEX idx_orders ON orders (id);
"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TRIGGER"));
        assert!(stmts[0].ends_with("END"));
        assert!(stmts[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_transaction_keywords_are_not_blocks() {
        let stmts = split_sql_statements("BEGIN; SELECT 1; END;");
        assert_eq!(stmts, vec!["BEGIN", "SELECT 1", "END"]);
    }
}
