//! Text query grammar.
//!
//! ```text
//! or    := and ( "|" and )*
//! and   := unary ( "+"? unary )*
//! unary := "-" unary | atom
//! atom  := "(" or ")" | '"' phrase '"' | word
//! ```
//!
//! Whitespace between terms is an implicit AND. A `-` only negates when it
//! starts a token, so `e-mail` stays a single word.

use crate::error::{Error, Result};

/// Parsed text query.
#[derive(Debug, Clone, PartialEq)]
pub enum TextExpr {
    Term(String),
    Phrase(String),
    And(Vec<TextExpr>),
    Or(Vec<TextExpr>),
    Not(Box<TextExpr>),
}

impl TextExpr {
    /// Parses a query string.
    ///
    /// # Example
    ///
    /// ```
    /// use labelsearch_core::query::TextExpr;
    ///
    /// let expr = TextExpr::parse("cash | negative").unwrap();
    /// assert_eq!(
    ///     expr,
    ///     TextExpr::Or(vec![
    ///         TextExpr::Term("cash".into()),
    ///         TextExpr::Term("negative".into()),
    ///     ])
    /// );
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(Error::InvalidQuery("empty text query".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(Error::InvalidQuery(format!(
                "unexpected {} in {:?}",
                token.describe(),
                input
            )));
        }
        Ok(expr)
    }

    /// Returns true if the expression can only exclude documents.
    pub fn is_negative(&self) -> bool {
        match self {
            TextExpr::Not(_) => true,
            TextExpr::And(items) | TextExpr::Or(items) => items.iter().all(TextExpr::is_negative),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Phrase(String),
    Or,
    And,
    Not,
    Open,
    Close,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("word {:?}", w),
            Token::Phrase(p) => format!("phrase {:?}", p),
            Token::Or => "'|'".into(),
            Token::And => "'+'".into(),
            Token::Not => "'-'".into(),
            Token::Open => "'('".into(),
            Token::Close => "')'".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut at_token_start = true;

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
                at_token_start = true;
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
                at_token_start = true;
            }
            '+' => {
                chars.next();
                tokens.push(Token::And);
                at_token_start = true;
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
                at_token_start = true;
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
                at_token_start = true;
            }
            '-' if at_token_start => {
                chars.next();
                tokens.push(Token::Not);
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(Error::InvalidQuery(format!("unterminated phrase in {:?}", input)));
                }
                if phrase.trim().is_empty() {
                    return Err(Error::InvalidQuery("empty phrase".into()));
                }
                tokens.push(Token::Phrase(phrase.trim().to_string()));
                at_token_start = true;
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '|' | '+' | '(' | ')' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
                at_token_start = false;
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<TextExpr> {
        let mut items = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            items.push(self.parse_and()?);
        }
        Ok(collapse(items, TextExpr::Or))
    }

    fn parse_and(&mut self) -> Result<TextExpr> {
        let mut items = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.next();
                    items.push(self.parse_unary()?);
                }
                Some(Token::Word(_)) | Some(Token::Phrase(_)) | Some(Token::Not)
                | Some(Token::Open) => items.push(self.parse_unary()?),
                _ => break,
            }
        }
        Ok(collapse(items, TextExpr::And))
    }

    fn parse_unary(&mut self) -> Result<TextExpr> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            return Ok(TextExpr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<TextExpr> {
        match self.next() {
            Some(Token::Word(w)) => Ok(TextExpr::Term(w)),
            Some(Token::Phrase(p)) => Ok(TextExpr::Phrase(p)),
            Some(Token::Open) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(expr),
                    _ => Err(Error::InvalidQuery("unbalanced parentheses".into())),
                }
            }
            Some(other) => Err(Error::InvalidQuery(format!(
                "expected a term, found {}",
                other.describe()
            ))),
            None => Err(Error::InvalidQuery("query ends with an operator".into())),
        }
    }
}

fn collapse(mut items: Vec<TextExpr>, wrap: fn(Vec<TextExpr>) -> TextExpr) -> TextExpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}
