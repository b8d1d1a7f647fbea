//! OData query options to IR.
//!
//! Recursive descent over the token list from [`super::lexer`]. Precedence,
//! loosest first: `or`, `and`, `not`, comparison, additive, multiplicative,
//! primary. `and`/`or` chains nest to the right; arithmetic is
//! left-associative, and an arithmetic operand followed by a comparison
//! becomes the comparison's left side (`price add 50 gt 100`).
//!
//! ```
//! use queryshape::odata::OpenDataParser;
//! use queryshape::query::{field, ExprExt};
//!
//! let filter = OpenDataParser::new().parse("price add 50 gt 100").unwrap();
//! assert_eq!(filter, field("price").add(50).gt(100));
//! ```

use tracing::debug;

use super::lexer::{tokenize, Token, TokenKind};
use super::query::{Levels, OpenDataQueryExpression};
use crate::config::ODataSettings;
use crate::error::{QueryError, QueryResult, Span, SyntaxErrorKind};
use crate::query::{
    ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator, OrderByExpr,
    QueryEntity, QueryExpression, QueryField,
};
use crate::resolve::{expect_args, MemberResolver, MethodEvent, Resolvers};

/// Parses `$filter`, `$select`, `$orderby`, `$groupby` and `$expand` text.
#[derive(Debug, Clone)]
pub struct OpenDataParser {
    resolvers: Resolvers,
    max_expand_depth: usize,
}

impl Default for OpenDataParser {
    fn default() -> Self {
        Self::with_settings(&ODataSettings::default())
    }
}

impl OpenDataParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &ODataSettings) -> Self {
        Self {
            resolvers: Resolvers::new(),
            max_expand_depth: settings.max_expand_depth,
        }
    }

    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Parse a `$filter` expression.
    pub fn parse(&self, text: &str) -> QueryResult<Expr> {
        let mut cursor = self.cursor(text)?;
        let expr = cursor.expression()?;
        cursor.finish()?;
        Ok(expr)
    }

    /// Parse a `$select` list. `*` entries are skipped; unnamed computed
    /// entries are named `field1`, `field2`, ...
    pub fn parse_select_sequence(&self, text: &str) -> QueryResult<Vec<QueryField>> {
        let mut cursor = self.cursor(text)?;
        let mut fields = Vec::new();
        let mut unnamed = 0;
        cursor.comma_separated(|cursor| {
            if cursor.eat(&TokenKind::Star) {
                return Ok(());
            }
            let expr = cursor.expression()?;
            let alias = if cursor.eat_keyword("as") {
                Some(cursor.identifier()?)
            } else {
                None
            };
            fields.push(match (alias, expr) {
                (Some(alias), expr) => QueryField::computed(alias, expr),
                (None, Expr::Field(path)) => QueryField::new(path),
                (None, expr) => {
                    unnamed += 1;
                    QueryField::computed(format!("field{}", unnamed), expr)
                }
            });
            Ok(())
        })?;
        cursor.finish()?;
        Ok(fields)
    }

    /// Parse an `$orderby` list of `expr [asc|desc]` terms.
    pub fn parse_order_by_sequence(&self, text: &str) -> QueryResult<Vec<OrderByExpr>> {
        let mut cursor = self.cursor(text)?;
        let mut terms = Vec::new();
        cursor.comma_separated(|cursor| {
            let expr = cursor.expression()?;
            terms.push(if cursor.eat_keyword("desc") {
                OrderByExpr::desc(expr)
            } else {
                cursor.eat_keyword("asc");
                OrderByExpr::asc(expr)
            });
            Ok(())
        })?;
        cursor.finish()?;
        Ok(terms)
    }

    /// Parse a `$groupby` list.
    pub fn parse_group_by_sequence(&self, text: &str) -> QueryResult<Vec<Expr>> {
        let mut cursor = self.cursor(text)?;
        let mut keys = Vec::new();
        cursor.comma_separated(|cursor| {
            keys.push(cursor.expression()?);
            Ok(())
        })?;
        cursor.finish()?;
        Ok(keys)
    }

    /// Parse an `$expand` list such as `customer/address,items($top=5;$select=sku)`.
    pub fn parse_expand_sequence(&self, text: &str) -> QueryResult<Vec<OpenDataQueryExpression>> {
        self.parse_expand_at(text, 1)
    }

    /// Build a query from raw query options. Unknown options are ignored.
    pub fn parse_query<I, K, V>(
        &self,
        collection: impl Into<QueryEntity>,
        options: I,
    ) -> QueryResult<OpenDataQueryExpression>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = QueryExpression::new();
        query.from_collection(collection);
        let mut result = OpenDataQueryExpression::new(query);
        for (key, value) in options {
            self.apply_query_option(&mut result, key.as_ref(), value.as_ref())?;
        }
        Ok(result)
    }

    /// Apply one raw query option to `target`. Returns `false`, and leaves
    /// `target` alone, when the option is not a query option.
    pub fn apply_query_option(
        &self,
        target: &mut OpenDataQueryExpression,
        key: &str,
        value: &str,
    ) -> QueryResult<bool> {
        let key = key.trim();
        let known = self.apply_option(target, key, value, 0)?;
        if !known {
            debug!(option = key, "ignoring unknown OData option");
        }
        Ok(known)
    }

    fn cursor<'s>(&'s self, text: &'s str) -> QueryResult<Cursor<'s>> {
        Ok(Cursor {
            source: text,
            tokens: tokenize(text)?,
            pos: 0,
            resolvers: &self.resolvers,
        })
    }

    fn parse_expand_at(&self, text: &str, depth: usize) -> QueryResult<Vec<OpenDataQueryExpression>> {
        self.check_depth(depth)?;
        let mut cursor = self.cursor(text)?;
        let mut items = Vec::new();
        cursor.comma_separated(|cursor| {
            let mut path = vec![cursor.identifier()?];
            while cursor.eat(&TokenKind::Slash) {
                path.push(cursor.identifier()?);
            }
            let depth = depth + path.len() - 1;
            self.check_depth(depth)?;

            let leaf_name = path.pop().unwrap_or_default();
            let mut node = OpenDataQueryExpression::navigation(&leaf_name);
            if cursor.eat(&TokenKind::LParen) {
                loop {
                    let name_span = cursor.current_span();
                    let name = cursor.identifier()?;
                    cursor.expect(&TokenKind::Equals)?;
                    let value = cursor.option_value()?;
                    let source = cursor.source;
                    let text = &source[value.clone()];
                    if !self
                        .apply_option(&mut node, &name, text, depth)
                        .map_err(|e| e.shifted(value.start))?
                    {
                        return Err(QueryError::syntax(
                            SyntaxErrorKind::UnexpectedToken(name),
                            name_span,
                        ));
                    }
                    if !cursor.eat(&TokenKind::Semicolon) {
                        cursor.expect(&TokenKind::RParen)?;
                        break;
                    }
                }
            }

            // `a/b(...)` is `a($expand=b(...))`.
            while let Some(parent) = path.pop() {
                let mut wrapper = OpenDataQueryExpression::navigation(&parent);
                wrapper.expand_with(node)?;
                node = wrapper;
            }
            items.push(node);
            Ok(())
        })?;
        cursor.finish()?;
        Ok(items)
    }

    fn check_depth(&self, depth: usize) -> QueryResult<()> {
        if depth > self.max_expand_depth {
            return Err(QueryError::unsupported(format!(
                "$expand nested deeper than {} levels",
                self.max_expand_depth
            )));
        }
        Ok(())
    }

    /// Apply one query option to `node`; `false` when the option is unknown.
    fn apply_option(
        &self,
        node: &mut OpenDataQueryExpression,
        name: &str,
        text: &str,
        depth: usize,
    ) -> QueryResult<bool> {
        debug!(option = name, value = text, "parsing OData option");
        match name.to_ascii_lowercase().as_str() {
            "$filter" => {
                node.query.where_expr(self.parse(text)?);
            }
            "$select" => {
                node.query.select(self.parse_select_sequence(text)?);
            }
            "$orderby" => {
                node.query.order_by_exprs(self.parse_order_by_sequence(text)?);
            }
            "$groupby" => {
                node.query.group_by(self.parse_group_by_sequence(text)?);
            }
            "$expand" => {
                for child in self.parse_expand_at(text, depth + 1)? {
                    node.expand_with(child)?;
                }
            }
            "$top" => {
                node.query.take(integer_option(text)?);
            }
            "$skip" => {
                node.query.skip(integer_option(text)?);
            }
            "$count" => node.count = bool_option(text)?,
            "$levels" => {
                node.levels = Some(if text.trim().eq_ignore_ascii_case("max") {
                    Levels::Max
                } else {
                    Levels::Count(parse_number(text)?)
                });
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> QueryResult<T> {
    text.trim().parse().map_err(|_| {
        QueryError::syntax(SyntaxErrorKind::InvalidLiteral(text.to_string()), 0..text.len())
    })
}

fn integer_option(text: &str) -> QueryResult<i64> {
    parse_number(text)
}

fn bool_option(text: &str) -> QueryResult<bool> {
    match text.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(QueryError::syntax(
            SyntaxErrorKind::InvalidLiteral(text.to_string()),
            0..text.len(),
        )),
    }
}

// =============================================================================
// Cursor
// =============================================================================

struct Cursor<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    resolvers: &'s Resolvers,
}

impl<'s> Cursor<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn current_span(&self) -> Span {
        match self.peek() {
            Some(token) => token.span.clone(),
            None => self.source.len()..self.source.len(),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> QueryResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn identifier(&mut self) -> QueryResult<String> {
        match self.peek().and_then(Token::ident) {
            Some(name) => {
                let name = name.to_string();
                self.pos += 1;
                Ok(name)
            }
            None => Err(QueryError::syntax(
                SyntaxErrorKind::ExpectedIdentifier,
                self.current_span(),
            )),
        }
    }

    /// Error for the current token, or for a premature end of input.
    fn unexpected(&self) -> QueryError {
        match self.peek() {
            Some(token) => QueryError::syntax(
                SyntaxErrorKind::UnexpectedToken(self.source[token.span.clone()].to_string()),
                token.span.clone(),
            ),
            None => QueryError::syntax(SyntaxErrorKind::ExpectedOperand, self.current_span()),
        }
    }

    fn finish(&self) -> QueryResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn comma_separated(
        &mut self,
        mut item: impl FnMut(&mut Self) -> QueryResult<()>,
    ) -> QueryResult<()> {
        loop {
            item(self)?;
            if !self.eat(&TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    /// Span of an expand option value: everything up to the next `;` or
    /// unbalanced `)`.
    fn option_value(&mut self) -> QueryResult<Span> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                TokenKind::Semicolon if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(QueryError::syntax(
                SyntaxErrorKind::ExpectedOperand,
                self.current_span(),
            ));
        }
        Ok(self.tokens[start].span.start..self.tokens[self.pos - 1].span.end)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self) -> QueryResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> QueryResult<Expr> {
        let left = self.and_expr()?;
        if self.eat_keyword("or") {
            let right = self.or_expr()?;
            return Ok(logical(LogicalOperator::Or, left, right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> QueryResult<Expr> {
        let left = self.not_expr()?;
        if self.eat_keyword("and") {
            let right = self.and_expr()?;
            return Ok(logical(LogicalOperator::And, left, right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> QueryResult<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> QueryResult<Expr> {
        let left = self.additive()?;
        let Some(op) = self.peek().and_then(Token::ident).and_then(comparison_operator) else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.additive()?;

        // `contains(x,'v') eq true` is the match itself.
        if let (Expr::RegexMatch { .. }, Expr::Literal(Literal::Bool(b))) = (&left, &right) {
            match (op, *b) {
                (ComparisonOperator::Eq, true) | (ComparisonOperator::Ne, false) => return Ok(left),
                (ComparisonOperator::Eq, false) | (ComparisonOperator::Ne, true) => {
                    return Ok(Expr::Not(Box::new(left)))
                }
                _ => {}
            }
        }
        Ok(Expr::compare(op, left, right))
    }

    fn additive(&mut self) -> QueryResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().and_then(Token::ident) {
                Some("add") => ArithmeticOperator::Add,
                Some("sub") => ArithmeticOperator::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::arithmetic(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> QueryResult<Expr> {
        let mut left = self.primary()?;
        loop {
            let op = match self.peek().and_then(Token::ident) {
                Some("mul") => ArithmeticOperator::Multiply,
                Some("div") => ArithmeticOperator::Divide,
                Some("mod") => ArithmeticOperator::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.primary()?;
            left = Expr::arithmetic(op, left, right);
        }
    }

    fn primary(&mut self) -> QueryResult<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(QueryError::syntax(
                SyntaxErrorKind::ExpectedOperand,
                self.current_span(),
            ));
        };
        match token.kind {
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Literal(lit) => {
                self.pos += 1;
                Ok(Expr::Literal(lit))
            }
            TokenKind::Identifier(name) if is_operator_keyword(&name) => Err(QueryError::syntax(
                SyntaxErrorKind::ExpectedOperand,
                token.span,
            )),
            TokenKind::Identifier(name) => {
                self.pos += 1;
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    if name.eq_ignore_ascii_case("case") {
                        self.case_expr()
                    } else {
                        self.method_call(&name)
                    }
                } else {
                    self.member_path(name)
                }
            }
            _ => Err(QueryError::syntax(SyntaxErrorKind::ExpectedOperand, token.span)),
        }
    }

    fn member_path(&mut self, first: String) -> QueryResult<Expr> {
        let mut segments = vec![first];
        while self.eat(&TokenKind::Slash) {
            segments.push(self.identifier()?);
        }
        if segments.len() > 1 && segments[0] == "$it" {
            segments.remove(0);
        }
        let member = segments.pop().unwrap_or_default();
        let path = if segments.is_empty() {
            self.resolvers.resolve_member(&member, None)
        } else {
            self.resolvers.resolve_join_member(&segments.join("."), &member)
        };
        Ok(Expr::Field(path))
    }

    fn method_call(&mut self, name: &str) -> QueryResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            self.comma_separated(|cursor| {
                args.push(cursor.expression()?);
                Ok(())
            })?;
            self.expect(&TokenKind::RParen)?;
        }
        self.resolvers.resolve_method(
            MethodEvent::new(name.to_ascii_lowercase(), args, false),
            &ODataFunctions,
        )
    }

    /// `case(c1:v1,c2:v2,true:default)`.
    fn case_expr(&mut self) -> QueryResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut branches = Vec::new();
        let mut default = None;
        self.comma_separated(|cursor| {
            if default.is_some() {
                return Err(cursor.unexpected());
            }
            let condition = cursor.expression()?;
            cursor.expect(&TokenKind::Colon)?;
            let value = cursor.expression()?;
            if condition == Expr::Literal(Literal::Bool(true)) {
                default = Some(value);
            } else {
                branches.push((condition, value));
            }
            Ok(())
        })?;
        self.expect(&TokenKind::RParen)?;

        if branches.len() == 1 {
            if let Some(otherwise) = default.take() {
                let (condition, then) = branches.remove(0);
                return Ok(Expr::cond(condition, then, otherwise));
            }
        }
        Ok(Expr::Switch {
            branches,
            default: default.map(Box::new),
        })
    }
}

fn logical(op: LogicalOperator, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        args: vec![left, right],
    }
}

fn comparison_operator(word: &str) -> Option<ComparisonOperator> {
    Some(match word {
        "eq" => ComparisonOperator::Eq,
        "ne" => ComparisonOperator::Ne,
        "gt" => ComparisonOperator::Gt,
        "ge" => ComparisonOperator::Gte,
        "lt" => ComparisonOperator::Lt,
        "le" => ComparisonOperator::Lte,
        _ => return None,
    })
}

fn is_operator_keyword(word: &str) -> bool {
    comparison_operator(word).is_some()
        || matches!(word, "and" | "or" | "add" | "sub" | "mul" | "div" | "mod" | "as" | "asc" | "desc")
}

// =============================================================================
// Default Function Table
// =============================================================================

/// OData functions understood without a resolver.
struct ODataFunctions;

impl MemberResolver for ODataFunctions {
    fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        let resolved = match event.name.as_str() {
            "count" => {
                expect_args(event, 0..=1)?;
                Expr::call(Func::Count, event.args.clone())
            }
            "min" => unary(event, Func::Min)?,
            "max" => unary(event, Func::Max)?,
            "avg" => unary(event, Func::Avg)?,
            "sum" => unary(event, Func::Sum)?,
            "year" => unary(event, Func::Year)?,
            "month" => unary(event, Func::Month)?,
            "day" => unary(event, Func::Day)?,
            "hour" => unary(event, Func::Hour)?,
            "minute" => unary(event, Func::Minute)?,
            "second" => unary(event, Func::Second)?,
            "tolower" => unary(event, Func::ToLower)?,
            "toupper" => unary(event, Func::ToUpper)?,
            "trim" => unary(event, Func::Trim)?,
            "length" => unary(event, Func::Length)?,
            "floor" => unary(event, Func::Floor)?,
            "ceiling" => unary(event, Func::Ceil)?,
            "round" => {
                expect_args(event, 1..=2)?;
                Expr::call(Func::Round, event.args.clone())
            }
            "indexof" => {
                expect_args(event, 2..=2)?;
                Expr::call(Func::IndexOf, event.args.clone())
            }
            "concat" => {
                expect_args(event, 2..=usize::MAX)?;
                Expr::call(Func::Concat, event.args.clone())
            }
            "substring" => {
                expect_args(event, 2..=3)?;
                Expr::call(Func::Substr, event.args.clone())
            }
            "add" => binary(event, ArithmeticOperator::Add)?,
            "sub" => binary(event, ArithmeticOperator::Subtract)?,
            "multiply" | "mul" => binary(event, ArithmeticOperator::Multiply)?,
            "div" => binary(event, ArithmeticOperator::Divide)?,
            "mod" => binary(event, ArithmeticOperator::Modulo)?,
            "startswith" | "endswith" | "contains" => {
                expect_args(event, 2..=2)?;
                let input = event.args[0].clone();
                let text = string_argument(event, 1)?;
                match event.name.as_str() {
                    "startswith" => Expr::starts_with(input, &text),
                    "endswith" => Expr::ends_with(input, &text),
                    _ => Expr::contains(input, &text),
                }
            }
            "matchespattern" => {
                expect_args(event, 2..=2)?;
                let pattern = string_argument(event, 1)?;
                match pattern.strip_prefix("(?i)") {
                    Some(rest) => {
                        Expr::regex_match(event.args[0].clone(), rest, Some("i".to_string()))
                    }
                    None => Expr::regex_match(event.args[0].clone(), pattern, None),
                }
            }
            _ => return Ok(()),
        };
        event.resolved = Some(resolved);
        Ok(())
    }
}

fn unary(event: &MethodEvent, func: Func) -> QueryResult<Expr> {
    expect_args(event, 1..=1)?;
    Ok(Expr::call(func, event.args.clone()))
}

fn binary(event: &MethodEvent, op: ArithmeticOperator) -> QueryResult<Expr> {
    expect_args(event, 2..=2)?;
    Ok(Expr::arithmetic(op, event.args[0].clone(), event.args[1].clone()))
}

fn string_argument(event: &MethodEvent, index: usize) -> QueryResult<String> {
    match &event.args[index] {
        Expr::Literal(Literal::String(s)) => Ok(s.clone()),
        other => Err(QueryError::UnsupportedArgumentType(format!(
            "{}() needs a string constant, found {:?}",
            event.name, other
        ))),
    }
}
