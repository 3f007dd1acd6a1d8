//! Recursive descent parser for `CREATE TABLE` definitions.
//!
//! The accepted grammar is the subset MySQL emits from `SHOW CREATE TABLE`:
//!
//! ```text
//! definition := CREATE [TEMPORARY] TABLE [IF NOT EXISTS] name
//!               '(' item (',' item)* ')' (option | comment)* [annotation] [';']
//! name       := ident ['.' ident]
//! item       := balanced tokens up to a top-level ',' or ')'
//! option     := word+ '=' (word | number | string | ident | '(' ... ')') [',']
//! annotation := everything after the last option, from a comment or PARTITION on
//! ```

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Option-name words that are followed by another name word
/// (`DEFAULT CHARSET`, `CHARACTER SET`, `DATA DIRECTORY`).
const MULTI_WORD_PREFIXES: &[&str] = &["DEFAULT", "CHARACTER", "DATA", "INDEX"];

/// Parser for a single table definition.
pub struct Parser<'source> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Tokenize `source` and create a parser over it.
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source,
        })
    }

    /// Parse a complete table definition.
    pub fn parse_definition(&mut self) -> Result<TableDefinition, ParseError> {
        let create = self.expect_keyword("CREATE")?;
        if self.peek_keyword("TEMPORARY") {
            self.next_token()?;
        }
        self.expect_keyword("TABLE")?;
        if self.peek_keyword("IF") {
            self.next_token()?;
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
        }

        let (schema, name) = self.parse_table_name()?;
        let open = self.expect_token(Token::LParen)?;
        let (items, close) = self.parse_items(open.span)?;
        let options = self.parse_options()?;
        let annotation = self.parse_annotation();

        let mut end = options.last().map(|opt| opt.span).unwrap_or(close);
        if let Some(annotation) = &annotation {
            end = end.merge(annotation.span);
        }
        if matches!(self.peek(), Some(Token::Semicolon)) {
            self.next_token()?;
        }
        if let Some(tok) = self.tokens.get(self.pos) {
            return Err(ParseError::new(
                format!("unexpected {:?} after table definition", tok.token),
                tok.span,
            ));
        }

        Ok(TableDefinition {
            name,
            schema,
            items,
            options,
            annotation: annotation.map(|a| a.value),
            span: create.span.merge(end),
        })
    }

    /// Parse `name` or `schema`.`name`.
    fn parse_table_name(&mut self) -> Result<(Option<String>, Spanned<String>), ParseError> {
        let first = self.expect_ident()?;
        if matches!(self.peek(), Some(Token::Dot)) {
            self.next_token()?;
            let second = self.expect_ident()?;
            return Ok((Some(first.value), second));
        }
        Ok((None, first))
    }

    /// Parse the column block; the opening paren is already consumed.
    fn parse_items(&mut self, open: Span) -> Result<(Vec<TableItem>, Span), ParseError> {
        let mut items = Vec::new();

        loop {
            items.push(self.parse_item(open)?);

            let sep = self.next_token()?;
            match sep.token {
                Token::Comma => continue,
                Token::RParen => return Ok((items, sep.span)),
                other => {
                    return Err(ParseError::new(
                        format!("expected ',' or ')' in column block, found {:?}", other),
                        sep.span,
                    ))
                }
            }
        }
    }

    /// Parse one declaration up to the next top-level separator.
    fn parse_item(&mut self, open: Span) -> Result<TableItem, ParseError> {
        let start = self.pos;
        let mut depth = 0usize;

        loop {
            let Some(tok) = self.tokens.get(self.pos) else {
                return Err(ParseError::new("unterminated column block", open)
                    .with_hint("the definition ends before the closing ')'"));
            };
            match tok.token {
                Token::LParen => depth += 1,
                Token::RParen if depth == 0 => break,
                Token::RParen => depth -= 1,
                Token::Comma if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }

        if self.pos == start {
            let span = self.tokens[self.pos].span;
            return Err(ParseError::new("empty declaration in column block", span));
        }

        let tokens = &self.tokens[start..self.pos];
        let span = tokens[0].span.merge(tokens[tokens.len() - 1].span);
        let kind = classify_item(tokens)?;

        Ok(TableItem {
            kind,
            text: span.slice(self.source).to_string(),
            span,
        })
    }

    /// Parse the table options following the column block.
    fn parse_options(&mut self) -> Result<Vec<TableOption>, ParseError> {
        let mut options = Vec::new();

        while let Some(tok) = self.tokens.get(self.pos).cloned() {
            match tok.token {
                Token::Comment(_) if self.option_follows() => {
                    self.pos += 1;
                    let text = tok.span.slice(self.source).to_string();
                    options.push(TableOption {
                        name: String::new(),
                        value: text.clone(),
                        text,
                        span: tok.span,
                    });
                }
                Token::Comment(_) | Token::Semicolon => break,
                ref word if word.is_keyword("PARTITION") => break,
                Token::Comma => self.pos += 1,
                Token::Word(_) => options.push(self.parse_option()?),
                other => {
                    return Err(ParseError::new(
                        format!("unexpected {:?} in table options", other),
                        tok.span,
                    ))
                }
            }
        }

        Ok(options)
    }

    /// Whether another option comes after the comments starting at the
    /// current token (`/*!50100 TABLESPACE ... */ ENGINE=InnoDB`).
    fn option_follows(&self) -> bool {
        self.tokens[self.pos..]
            .iter()
            .find(|t| !matches!(t.token, Token::Comment(_)))
            .is_some_and(|t| matches!(t.token, Token::Word(_)) && !t.token.is_keyword("PARTITION"))
    }

    /// Parse a single `NAME [NAME...] = value` option.
    fn parse_option(&mut self) -> Result<TableOption, ParseError> {
        let first = self.next_token()?;
        let mut words = Vec::new();
        if let Token::Word(word) = &first.token {
            words.push(word.to_ascii_uppercase());
        }

        loop {
            let tok = self.next_token()?;
            let continues_name = words
                .last()
                .is_some_and(|w| MULTI_WORD_PREFIXES.contains(&w.as_str()));
            match tok.token {
                Token::Word(word) if continues_name => words.push(word.to_ascii_uppercase()),
                Token::Eq => break,
                other => {
                    return Err(ParseError::new(
                        format!("expected '=' after table option {}, found {:?}", words.join(" "), other),
                        tok.span,
                    ))
                }
            }
        }

        let value_span = self.parse_option_value()?;
        let span = first.span.merge(value_span);

        Ok(TableOption {
            name: words.join(" "),
            value: value_span.slice(self.source).to_string(),
            text: span.slice(self.source).to_string(),
            span,
        })
    }

    fn parse_option_value(&mut self) -> Result<Span, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Word(_) | Token::Number(_) | Token::StringLit(_) | Token::QuotedIdent(_) => {
                Ok(tok.span)
            }
            Token::LParen => {
                let mut depth = 1usize;
                let mut end = tok.span;
                while depth > 0 {
                    let inner = self.next_token()?;
                    match inner.token {
                        Token::LParen => depth += 1,
                        Token::RParen => depth -= 1,
                        _ => {}
                    }
                    end = inner.span;
                }
                Ok(tok.span.merge(end))
            }
            other => Err(ParseError::new(
                format!("expected option value, found {:?}", other),
                tok.span,
            )),
        }
    }

    /// Capture the trailing annotation verbatim, leaving a final ';' alone.
    fn parse_annotation(&mut self) -> Option<Spanned<String>> {
        let remaining = &self.tokens[self.pos..];
        let body = match remaining.last() {
            Some(last) if last.token == Token::Semicolon => &remaining[..remaining.len() - 1],
            _ => remaining,
        };
        let span = body.first()?.span.merge(body.last()?.span);
        let consumed = body.len();
        self.pos += consumed;
        Some(Spanned::new(span.slice(self.source).to_string(), span))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    /// Expect and consume a keyword.
    fn expect_keyword(&mut self, keyword: &str) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if tok.token.is_keyword(keyword) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {}, found {:?}", keyword, tok.token),
                tok.span,
            ))
        }
    }

    /// Expect and consume an identifier.
    fn expect_ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::QuotedIdent(name) | Token::Word(name) => Ok(Spanned::new(name, tok.span)),
            other => Err(ParseError::new(
                format!("expected table name, found {:?}", other),
                tok.span,
            )),
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {:?}, found {:?}", expected, tok.token),
                tok.span,
            ))
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or_else(|| {
            ParseError::new(
                "unexpected end of definition",
                Span::new(self.source.len(), self.source.len()),
            )
        })?;
        self.pos += 1;
        Ok(tok)
    }
}

/// Classify a declaration by its leading keyword.
fn classify_item(tokens: &[SpannedToken]) -> Result<ItemKind, ParseError> {
    let first = &tokens[0];
    let kind = match &first.token {
        Token::QuotedIdent(name) => column(name, tokens),
        t if t.is_keyword("PRIMARY") => ItemKind::PrimaryKey {
            columns: key_columns(tokens)?,
        },
        t if t.is_keyword("KEY") || t.is_keyword("INDEX") => ItemKind::Index,
        t if t.is_keyword("UNIQUE") => ItemKind::Unique,
        t if t.is_keyword("FULLTEXT") || t.is_keyword("SPATIAL") => ItemKind::OtherKey,
        t if t.is_keyword("CONSTRAINT") => {
            // CONSTRAINT [symbol] PRIMARY KEY (...)
            if tokens.iter().take(3).any(|t| t.token.is_keyword("PRIMARY")) {
                ItemKind::PrimaryKey {
                    columns: key_columns(tokens)?,
                }
            } else {
                ItemKind::Constraint
            }
        }
        t if t.is_keyword("CHECK") => ItemKind::Constraint,
        Token::Word(name) => column(name, tokens),
        other => {
            return Err(ParseError::new(
                format!("expected column or key declaration, found {:?}", other),
                first.span,
            ))
        }
    };
    Ok(kind)
}

fn column(name: &str, tokens: &[SpannedToken]) -> ItemKind {
    ItemKind::Column {
        name: name.to_string(),
        auto_increment: tokens.iter().any(|t| t.token.is_keyword("AUTO_INCREMENT")),
    }
}

/// Extract column names from the first parenthesized key-part list.
///
/// Prefix lengths (`col(10)`) and sort order (`DESC`) are dropped.
fn key_columns(tokens: &[SpannedToken]) -> Result<Vec<String>, ParseError> {
    let Some(open) = tokens.iter().position(|t| t.token == Token::LParen) else {
        return Err(ParseError::new(
            "key declaration has no column list",
            tokens[0].span.merge(tokens[tokens.len() - 1].span),
        ));
    };

    let mut columns = Vec::new();
    let mut depth = 0usize;
    let mut expect_name = true;

    for tok in &tokens[open..] {
        match &tok.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Token::Comma if depth == 1 => expect_name = true,
            token if depth == 1 && expect_name => {
                if let Some(name) = token.identifier() {
                    columns.push(name.to_string());
                    expect_name = false;
                }
            }
            _ => {}
        }
    }

    if columns.is_empty() {
        return Err(ParseError::new(
            "key declaration names no columns",
            tokens[open].span,
        ));
    }
    Ok(columns)
}

/// Parse a definition into a syntax tree.
pub fn parse(source: &str) -> Result<TableDefinition, ParseError> {
    Parser::new(source)?.parse_definition()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = "CREATE TABLE `orders` (
  `id` bigint unsigned NOT NULL AUTO_INCREMENT,
  `customer_id` int NOT NULL,
  `note` varchar(255) COLLATE utf8mb4_unicode_ci DEFAULT 'n/a, (none)',
  `total` decimal(10,2) NOT NULL DEFAULT '0.00',
  PRIMARY KEY (`id`),
  UNIQUE KEY `uq_note` (`note`(32)),
  KEY `idx_customer` (`customer_id`,`total` DESC),
  CONSTRAINT `fk_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`)
) ENGINE=InnoDB AUTO_INCREMENT=1042 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci COMMENT='orders, by id'";

    #[test]
    fn test_parse_table_name() {
        let def = parse(ORDERS).unwrap();
        assert_eq!(def.name.value, "orders");
        assert_eq!(def.schema, None);
    }

    #[test]
    fn test_parse_items() {
        let def = parse(ORDERS).unwrap();
        assert_eq!(def.items.len(), 8);
        assert_eq!(
            def.items[0].kind,
            ItemKind::Column {
                name: "id".to_string(),
                auto_increment: true
            }
        );
        assert_eq!(
            def.items[2].text,
            "`note` varchar(255) COLLATE utf8mb4_unicode_ci DEFAULT 'n/a, (none)'"
        );
        assert_eq!(def.items[3].text, "`total` decimal(10,2) NOT NULL DEFAULT '0.00'");
        assert_eq!(def.items[5].kind, ItemKind::Unique);
        assert_eq!(def.items[6].kind, ItemKind::Index);
        assert_eq!(def.items[7].kind, ItemKind::Constraint);
    }

    #[test]
    fn test_parse_primary_key() {
        let def = parse(ORDERS).unwrap();
        assert_eq!(def.primary_key(), Some(&["id".to_string()][..]));
    }

    #[test]
    fn test_parse_composite_primary_key_with_prefix() {
        let def = parse(
            "CREATE TABLE `t` (`a` int, `b` text, PRIMARY KEY (`a`,`b`(16)) USING BTREE) ENGINE=InnoDB",
        )
        .unwrap();
        assert_eq!(
            def.primary_key(),
            Some(&["a".to_string(), "b".to_string()][..])
        );
    }

    #[test]
    fn test_parse_options() {
        let def = parse(ORDERS).unwrap();
        let names: Vec<&str> = def.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ENGINE", "AUTO_INCREMENT", "DEFAULT CHARSET", "COLLATE", "COMMENT"]
        );
        assert_eq!(def.engine(), Some("InnoDB"));
        assert_eq!(def.charset(), Some("utf8mb4"));
        assert_eq!(def.option("COMMENT").unwrap().value, "'orders, by id'");
        assert_eq!(def.annotation, None);
    }

    #[test]
    fn test_parse_partition_annotation() {
        let def = parse(
            "CREATE TABLE `logs` (
  `id` bigint NOT NULL AUTO_INCREMENT,
  `msg` text,
  KEY `idx_id` (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=latin1
/*!50100 PARTITION BY KEY (`id`)
PARTITIONS 4 */",
        )
        .unwrap();
        assert_eq!(
            def.annotation.as_deref(),
            Some("/*!50100 PARTITION BY KEY (`id`)\nPARTITIONS 4 */")
        );
        assert!(def.is_key_partitioned());
        assert_eq!(def.primary_key(), None);
        assert_eq!(def.auto_increment_columns(), vec!["id"]);
    }

    #[test]
    fn test_parse_comment_between_options() {
        let def = parse(
            "CREATE TABLE `t` (
  `id` int NOT NULL,
  PRIMARY KEY (`id`)
) /*!50100 TABLESPACE `ts` */ ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
/*!50100 PARTITION BY KEY (`id`) */",
        )
        .unwrap();
        let names: Vec<&str> = def.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["", "ENGINE", "DEFAULT CHARSET"]);
        assert_eq!(def.options[0].text, "/*!50100 TABLESPACE `ts` */");
        assert_eq!(def.engine(), Some("InnoDB"));
        assert_eq!(
            def.annotation.as_deref(),
            Some("/*!50100 PARTITION BY KEY (`id`) */")
        );
    }

    #[test]
    fn test_parse_bare_partition_clause() {
        let def = parse(
            "CREATE TABLE t (id int) ENGINE=InnoDB PARTITION BY KEY (id) PARTITIONS 2;",
        )
        .unwrap();
        assert_eq!(
            def.annotation.as_deref(),
            Some("PARTITION BY KEY (id) PARTITIONS 2")
        );
    }

    #[test]
    fn test_parse_schema_qualified_name() {
        let def = parse("CREATE TABLE IF NOT EXISTS `shop`.`users` (`id` int) ENGINE=InnoDB").unwrap();
        assert_eq!(def.schema.as_deref(), Some("shop"));
        assert_eq!(def.name.value, "users");
    }

    #[test]
    fn test_error_missing_column_block() {
        let err = parse("CREATE TABLE `t` ENGINE=InnoDB").unwrap_err();
        assert!(err.message.contains("expected LParen"));
        assert_eq!(err.span, Span::new(17, 23));
    }

    #[test]
    fn test_error_unterminated_column_block() {
        let err = parse("CREATE TABLE `t` (`id` int, KEY `k` (`id`)").unwrap_err();
        assert_eq!(err.message, "unterminated column block");
        assert_eq!(err.span, Span::new(17, 18));
    }

    #[test]
    fn test_error_option_without_value() {
        let err = parse("CREATE TABLE `t` (`id` int) ENGINE InnoDB").unwrap_err();
        assert!(err.message.contains("expected '=' after table option ENGINE"));
    }

    #[test]
    fn test_error_not_a_create_statement() {
        let err = parse("ALTER TABLE `t` ADD KEY (`id`)").unwrap_err();
        assert!(err.message.starts_with("expected CREATE"));
        assert_eq!(err.span, Span::new(0, 5));
    }
}
