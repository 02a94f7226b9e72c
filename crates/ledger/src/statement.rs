//! Statement text understood by the ledger service.
//!
//! The service accepts a small, string-based statement language:
//!
//! ```text
//! CREATE TABLE <name>
//! INSERT INTO <name> VALUE { 'field': value, ... }
//! INSERT INTO <name> << { ... }, { ... } >>
//! SELECT * FROM <name>
//! ```
//!
//! Keywords are case-insensitive. Table names are identifiers
//! (`[A-Za-z_][A-Za-z0-9_]*`, at most 128 characters). Struct literals use
//! single- or double-quoted keys (bare identifiers are accepted too) and
//! values that are structs, lists, strings, numbers, `true`, `false` or
//! `null`.
//!
//! [`Statement`] is used in both directions: callers build one and render it
//! with `Display`, the service parses submitted text with
//! [`Statement::parse`]. Parse failures are reported as
//! [`LedgerError::Execution`], the same way the service reports any other
//! rejected statement.

use std::fmt::{self, Write as _};

use serde_json::{Map, Number, Value};

use crate::{
    error::{LedgerError, LedgerResult},
    types::Document,
};

/// Maximum length of a table name.
pub const MAX_TABLE_NAME_LEN: usize = 128;

/// A parsed statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE <table>`
    CreateTable {
        /// Table to create.
        table: String,
    },
    /// `INSERT INTO <table> VALUE <document>` or the `<< ... >>` bag form.
    Insert {
        /// Target table.
        table: String,
        /// Documents to insert, in order.
        documents: Vec<Document>,
    },
    /// `SELECT * FROM <table>`
    SelectAll {
        /// Table to read.
        table: String,
    },
}

impl Statement {
    /// Builds a `CREATE TABLE` statement.
    #[must_use]
    pub fn create_table(table: impl Into<String>) -> Self {
        Self::CreateTable { table: table.into() }
    }

    /// Builds an `INSERT` statement for a single document.
    #[must_use]
    pub fn insert(table: impl Into<String>, document: Document) -> Self {
        Self::Insert { table: table.into(), documents: vec![document] }
    }

    /// Builds a `SELECT * FROM` statement.
    #[must_use]
    pub fn select_all(table: impl Into<String>) -> Self {
        Self::SelectAll { table: table.into() }
    }

    /// Returns the table the statement targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table }
            | Self::Insert { table, .. }
            | Self::SelectAll { table } => table,
        }
    }

    /// Returns `true` if executing the statement changes ledger data.
    #[must_use]
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::SelectAll { .. })
    }

    /// Parses statement text.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Execution`] describing the first syntax error.
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let mut parser = Parser::new(text);
        let statement = parser.statement()?;
        parser.skip_ws();
        if parser.peek() == Some(';') {
            parser.bump();
            parser.skip_ws();
        }
        if parser.peek().is_some() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(statement)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table } => write!(f, "CREATE TABLE {table}"),
            Self::SelectAll { table } => write!(f, "SELECT * FROM {table}"),
            Self::Insert { table, documents } => {
                let mut literal = String::new();
                if let [document] = documents.as_slice() {
                    write_struct(&mut literal, document.fields());
                    write!(f, "INSERT INTO {table} VALUE {literal}")
                } else {
                    literal.push_str("<< ");
                    for (idx, document) in documents.iter().enumerate() {
                        if idx > 0 {
                            literal.push_str(", ");
                        }
                        write_struct(&mut literal, document.fields());
                    }
                    literal.push_str(" >>");
                    write!(f, "INSERT INTO {table} {literal}")
                }
            },
        }
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        },
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        },
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        },
        Value::Object(fields) => write_struct(out, fields),
    }
}

fn write_struct(out: &mut String, fields: &Map<String, Value>) {
    if fields.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{ ");
    for (idx, (key, value)) in fields.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        write_string(out, key);
        out.push_str(": ");
        write_value(out, value);
    }
    out.push_str(" }");
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

/// Returns `true` if `name` is a valid table name.
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_TABLE_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Recursive-descent parser over statement text.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: &str) -> LedgerError {
        LedgerError::execution(format!("syntax error at offset {}: {message}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> LedgerResult<()> {
        if self.eat(expected) { Ok(()) } else { Err(self.error(&format!("expected '{expected}'"))) }
    }

    fn word(&mut self) -> &'a str {
        self.skip_ws();
        let src = self.src;
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        &src[start..self.pos]
    }

    fn keyword(&mut self, keyword: &str) -> LedgerResult<()> {
        let word = self.word();
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn table_name(&mut self) -> LedgerResult<String> {
        let name = self.word();
        if is_valid_table_name(name) {
            Ok(name.to_owned())
        } else if name.is_empty() {
            Err(self.error("expected table name"))
        } else {
            Err(self.error(&format!("invalid table name '{name}'")))
        }
    }

    fn statement(&mut self) -> LedgerResult<Statement> {
        let verb = self.word();
        if verb.eq_ignore_ascii_case("CREATE") {
            self.keyword("TABLE")?;
            let table = self.table_name()?;
            Ok(Statement::CreateTable { table })
        } else if verb.eq_ignore_ascii_case("INSERT") {
            self.keyword("INTO")?;
            let table = self.table_name()?;
            let documents = self.insert_payload()?;
            Ok(Statement::Insert { table, documents })
        } else if verb.eq_ignore_ascii_case("SELECT") {
            self.expect('*')?;
            self.keyword("FROM")?;
            let table = self.table_name()?;
            Ok(Statement::SelectAll { table })
        } else if verb.is_empty() {
            Err(self.error("empty statement"))
        } else {
            Err(self.error(&format!("unsupported statement '{verb}'")))
        }
    }

    fn insert_payload(&mut self) -> LedgerResult<Vec<Document>> {
        self.skip_ws();
        if self.src[self.pos..].starts_with("<<") {
            self.pos += 2;
            let mut documents = Vec::new();
            if !self.eat_bag_end() {
                documents.push(self.document()?);
                while self.eat(',') {
                    documents.push(self.document()?);
                }
                if !self.eat_bag_end() {
                    return Err(self.error("expected '>>'"));
                }
            }
            Ok(documents)
        } else {
            self.keyword("VALUE")?;
            Ok(vec![self.document()?])
        }
    }

    fn eat_bag_end(&mut self) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(">>") {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn document(&mut self) -> LedgerResult<Document> {
        self.skip_ws();
        if self.peek() != Some('{') {
            return Err(self.error("expected a struct"));
        }
        match self.value()? {
            Value::Object(fields) => Ok(Document::new(fields)),
            _ => Err(self.error("expected a struct")),
        }
    }

    fn value(&mut self) -> LedgerResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.struct_value(),
            Some('[') => self.list_value(),
            Some(quote @ ('\'' | '"')) => Ok(Value::String(self.string(quote)?)),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.word();
                match word {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    other => Err(self.error(&format!("unexpected symbol '{other}'"))),
                }
            },
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of statement")),
        }
    }

    fn struct_value(&mut self) -> LedgerResult<Value> {
        self.expect('{')?;
        let mut fields = Map::new();
        if self.eat('}') {
            return Ok(Value::Object(fields));
        }
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some(quote @ ('\'' | '"')) => self.string(quote)?,
                _ => {
                    let word = self.word();
                    if word.is_empty() {
                        return Err(self.error("expected field name"));
                    }
                    word.to_owned()
                },
            };
            self.expect(':')?;
            let value = self.value()?;
            fields.insert(key, value);
            if self.eat('}') {
                return Ok(Value::Object(fields));
            }
            self.expect(',')?;
        }
    }

    fn list_value(&mut self) -> LedgerResult<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        if self.eat(']') {
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            if self.eat(']') {
                return Ok(Value::Array(items));
            }
            self.expect(',')?;
        }
    }

    fn string(&mut self, quote: char) -> LedgerResult<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => return Err(self.error(&format!("unknown escape '\\{c}'"))),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> LedgerResult<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+'))
        {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.error(&format!("invalid decimal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Number::from)
                .or_else(|_| text.parse::<u64>().map(Number::from))
                .map(Value::Number)
                .map_err(|_| self.error(&format!("invalid integer '{text}'")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_create_table() {
        let stmt = Statement::parse("CREATE TABLE MyTable").unwrap();
        assert_eq!(stmt, Statement::create_table("MyTable"));
        assert!(stmt.is_write());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let stmt = Statement::parse("select * from MyTable").unwrap();
        assert_eq!(stmt, Statement::select_all("MyTable"));
        assert!(!stmt.is_write());
    }

    #[test]
    fn test_parse_insert_with_lowercase_value_keyword() {
        let stmt = Statement::parse("INSERT INTO MyTable value { 'mytabledate': 1700000000000}")
            .unwrap();
        let Statement::Insert { table, documents } = stmt else {
            unreachable!("expected insert");
        };
        assert_eq!(table, "MyTable");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].get("mytabledate"), Some(&json!(1_700_000_000_000_i64)));
    }

    #[test]
    fn test_parse_insert_bag() {
        let stmt =
            Statement::parse(r#"INSERT INTO Orders << {'id': 1}, {"id": 2, note: 'it\'s'} >>;"#)
                .unwrap();
        let Statement::Insert { documents, .. } = stmt else {
            unreachable!("expected insert");
        };
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].get("note"), Some(&json!("it's")));
    }

    #[test]
    fn test_parse_nested_values() {
        let stmt = Statement::parse(
            "INSERT INTO T VALUE { 'a': [1, -2.5, 'x'], 'b': { 'c': null, 'd': true } }",
        )
        .unwrap();
        let Statement::Insert { documents, .. } = stmt else {
            unreachable!("expected insert");
        };
        assert_eq!(documents[0].get("a"), Some(&json!([1, -2.5, "x"])));
        assert_eq!(documents[0].get("b"), Some(&json!({"c": null, "d": true})));
    }

    #[test]
    fn test_parse_errors_are_execution_errors() {
        for text in [
            "",
            "DROP TABLE MyTable",
            "CREATE TABLE",
            "CREATE TABLE bad-name",
            "SELECT name FROM T",
            "INSERT INTO T VALUE [1]",
            "INSERT INTO T VALUE { 'a': }",
            "INSERT INTO T VALUE { 'a': 'unterminated }",
            "INSERT INTO T << { 'a': 1 }",
            "CREATE TABLE T extra",
        ] {
            assert!(
                matches!(Statement::parse(text), Err(LedgerError::Execution { .. })),
                "{text:?} should fail to parse"
            );
        }
    }

    #[test]
    fn test_display_matches_statement_format() {
        assert_eq!(Statement::create_table("MyTable").to_string(), "CREATE TABLE MyTable");
        assert_eq!(Statement::select_all("MyTable").to_string(), "SELECT * FROM MyTable");
        assert_eq!(
            Statement::insert("MyTable", Document::with_field("mytabledate", 5)).to_string(),
            "INSERT INTO MyTable VALUE { 'mytabledate': 5 }"
        );
    }

    #[test]
    fn test_literal_escapes_quotes() {
        let document = Document::new(Map::from_iter([
            ("note".to_owned(), json!("it's")),
            ("empty".to_owned(), json!({})),
        ]));
        assert_eq!(
            Statement::insert("T", document).to_string(),
            r"INSERT INTO T VALUE { 'empty': {}, 'note': 'it\'s' }"
        );
    }

    #[test]
    fn test_unsigned_integers_above_i64_are_accepted() {
        let document = Document::with_field("n", u64::MAX);
        let rendered = Statement::insert("T", document.clone()).to_string();
        assert_eq!(rendered, "INSERT INTO T VALUE { 'n': 18446744073709551615 }");
        assert_eq!(Statement::parse(&rendered).unwrap(), Statement::insert("T", document));

        assert!(Statement::parse("INSERT INTO T VALUE { 'n': 18446744073709551616 }").is_err());
        assert!(Statement::parse("INSERT INTO T VALUE { 'n': -9223372036854775809 }").is_err());
    }

    #[test]
    fn test_empty_bag_round_trips() {
        let empty = Statement::Insert { table: "T".into(), documents: Vec::new() };
        let rendered = empty.to_string();
        assert_eq!(rendered, "INSERT INTO T <<  >>");
        assert_eq!(Statement::parse(&rendered).unwrap(), empty);
        assert_eq!(Statement::parse("INSERT INTO T <<>>").unwrap(), empty);
        assert!(Statement::parse("INSERT INTO T << >").is_err());
    }

    #[test]
    fn test_statement_target_table() {
        assert_eq!(Statement::create_table("A").table(), "A");
        assert_eq!(Statement::insert("B", Document::with_field("x", 1)).table(), "B");
        assert_eq!(Statement::select_all("C").table(), "C");
    }

    #[test]
    fn test_table_name_rules() {
        assert!(is_valid_table_name("MyTable"));
        assert!(is_valid_table_name("_orders_2024"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2024orders"));
        assert!(!is_valid_table_name(&"t".repeat(MAX_TABLE_NAME_LEN + 1)));
    }

    proptest! {
        /// The parser must reject garbage with an error, never a panic.
        #[test]
        fn parse_never_panics(text in "\\PC{0,64}") {
            let _ = Statement::parse(&text);
        }

        /// An insert rendered by `Display` parses back to the same document.
        #[test]
        fn rendered_insert_is_accepted(
            field in "[a-z][a-z0-9_]{0,12}",
            text in "\\PC{0,24}",
            number in any::<i64>(),
            unsigned in any::<u64>(),
        ) {
            let mut fields = Map::new();
            fields.insert(field.clone(), json!(text));
            fields.insert(format!("{field}_n"), json!(number));
            fields.insert(format!("{field}_u"), json!(unsigned));
            let document = Document::new(fields);

            let rendered = Statement::insert("T", document.clone()).to_string();
            let parsed = Statement::parse(&rendered).expect("rendered insert must parse");
            prop_assert_eq!(parsed, Statement::insert("T", document));
        }
    }
}
