//! Output tokens for SQL rendering.
//!
//! Statements are assembled as a [`TokenStream`] and serialized once, at the
//! end, against a [`SqlDialect`]. Only identifiers, literals and the concat
//! operator depend on the dialect; everything else has a fixed spelling.

use super::dialect::SqlDialect;

macro_rules! keywords {
    ($($variant:ident => $text:literal),* $(,)?) => {
        /// Reserved words the formatter emits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Keyword {
            $($variant),*
        }

        impl Keyword {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text),*
                }
            }
        }
    };
}

keywords! {
    Select => "SELECT",
    Distinct => "DISTINCT",
    From => "FROM",
    Where => "WHERE",
    GroupBy => "GROUP BY",
    OrderBy => "ORDER BY",
    Asc => "ASC",
    Desc => "DESC",
    Limit => "LIMIT",
    Offset => "OFFSET",
    Inner => "INNER",
    Left => "LEFT",
    Right => "RIGHT",
    Join => "JOIN",
    On => "ON",
    As => "AS",
    And => "AND",
    Or => "OR",
    Not => "NOT",
    Is => "IS",
    Like => "LIKE",
    Case => "CASE",
    When => "WHEN",
    Then => "THEN",
    Else => "ELSE",
    End => "END",
    Cast => "CAST",
    Insert => "INSERT",
    Into => "INTO",
    Values => "VALUES",
    Update => "UPDATE",
    Set => "SET",
    Delete => "DELETE",
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    /// Punctuation or an operator with one spelling in every dialect
    /// (`(`, `,`, `=`, `<>`, `~*`, `REGEXP`).
    Symbol(&'static str),
    /// String concatenation; `||` unless the dialect says otherwise.
    Concat,
    Space,

    /// Table, column or alias name, quoted by the dialect.
    Ident(String),
    LitInt(i64),
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,

    /// Function name, upper-cased on output.
    FunctionName(String),

    /// Trusted static SQL (type names, date-part keywords, exact decimals).
    ///
    /// Never pass user input to this variant.
    Raw(String),
}

impl Token {
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            Token::Keyword(kw) => kw.as_str().into(),
            Token::Symbol(s) => (*s).into(),
            Token::Concat => dialect.concat_operator().into(),
            Token::Space => " ".into(),
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::LitInt(n) => n.to_string(),
            // Non-finite values are rejected before tokenizing.
            Token::LitFloat(f) => ryu::Buffer::new().format(*f).to_string(),
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => dialect.format_null().into(),
            Token::FunctionName(name) => name.to_uppercase(),
            Token::Raw(s) => s.clone(),
        }
    }
}

impl From<Keyword> for Token {
    fn from(kw: Keyword) -> Self {
        Token::Keyword(kw)
    }
}

/// An ordered run of tokens, built up with chained pushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: impl Into<Token>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    pub fn keyword(&mut self, kw: Keyword) -> &mut Self {
        self.push(kw)
    }

    /// Push several keywords separated by single spaces (`INSERT INTO`).
    pub fn keywords(&mut self, kws: impl IntoIterator<Item = Keyword>) -> &mut Self {
        for (i, kw) in kws.into_iter().enumerate() {
            if i > 0 {
                self.space();
            }
            self.keyword(kw);
        }
        self
    }

    pub fn symbol(&mut self, s: &'static str) -> &mut Self {
        self.push(Token::Symbol(s))
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Append `items` separated by `, `.
    pub fn comma_separated<'a>(&mut self, items: impl IntoIterator<Item = &'a TokenStream>) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            self.append(item);
        }
        self
    }

    pub fn parenthesized(mut self) -> Self {
        self.tokens.insert(0, Token::Symbol("("));
        self.tokens.push(Token::Symbol(")"));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn comma(&mut self) -> &mut Self {
        self.symbol(",")
    }

    pub fn lparen(&mut self) -> &mut Self {
        self.symbol("(")
    }

    pub fn rparen(&mut self) -> &mut Self {
        self.symbol(")")
    }
}

impl From<Token> for TokenStream {
    fn from(token: Token) -> Self {
        Self {
            tokens: vec![token],
        }
    }
}
