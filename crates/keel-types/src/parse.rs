//! Parser for type expressions such as `java.util.Map<K, ? extends V>[]`.

use crate::error::TypeResolveError;
use crate::tree::{PrimitiveKind, TreeArena, TreeId, TreeKind, WildcardBound};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Symbol(char),
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, TypeResolveError> {
    let is_ident_part = |ch: char| ch.is_alphanumeric() || ch == '_' || ch == '$';
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        } else if matches!(c, '<' | '>' | ',' | '.' | '[' | ']' | '?') {
            tokens.push(Token::Symbol(c));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let mut end = start + c.len_utf8();
            while let Some(&(index, next)) = chars.peek() {
                if !is_ident_part(next) {
                    break;
                }
                end = index + next.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(text.get(start..end).unwrap_or_default()));
        } else {
            return Err(TypeResolveError::Parse {
                text: text.to_owned(),
                reason: format!("unexpected character `{c}`"),
            });
        }
    }
    Ok(tokens)
}

struct Parser<'t, 'a> {
    text: &'a str,
    tokens: &'t [Token<'a>],
    position: usize,
    arena: &'t mut TreeArena,
}

impl<'a> Parser<'_, 'a> {
    fn error(&self, reason: &str) -> TypeResolveError {
        TypeResolveError::Parse {
            text: self.text.to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<&'a str, TypeResolveError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("expected an identifier")),
        }
    }

    /// type := (primitive | wildcard | reference) ('[' ']')*
    fn parse_type(&mut self) -> Result<TreeId, TypeResolveError> {
        let mut ty = if self.eat('?') {
            self.parse_wildcard()?
        } else {
            match self.peek() {
                Some(Token::Ident(word)) => match PrimitiveKind::from_keyword(word) {
                    Some(kind) => {
                        self.position += 1;
                        self.arena.alloc(TreeKind::PrimitiveType(kind))?
                    }
                    None => self.parse_reference()?,
                },
                _ => return Err(self.error("expected a type")),
            }
        };

        while self.eat('[') {
            if !self.eat(']') {
                return Err(self.error("expected `]`"));
            }
            ty = self.arena.alloc(TreeKind::ArrayType { component: ty })?;
        }
        Ok(ty)
    }

    /// wildcard := '?' (('extends' | 'super') type)?
    fn parse_wildcard(&mut self) -> Result<TreeId, TypeResolveError> {
        let bound = match self.peek() {
            Some(Token::Ident("extends")) => Some(WildcardBound::Extends),
            Some(Token::Ident("super")) => Some(WildcardBound::Super),
            _ => None,
        };
        let bound = match bound {
            Some(direction) => {
                self.position += 1;
                Some((direction, self.parse_type()?))
            }
            None => None,
        };
        Ok(self.arena.alloc(TreeKind::Wildcard { bound })?)
    }

    /// reference := ident args? ('.' ident args?)*
    fn parse_reference(&mut self) -> Result<TreeId, TypeResolveError> {
        let name = self.expect_ident()?.to_owned();
        let mut ty = self.arena.alloc(TreeKind::Identifier { name })?;
        ty = self.parse_arguments(ty)?;
        while self.eat('.') {
            let name = self.expect_ident()?.to_owned();
            ty = self.arena.alloc(TreeKind::MemberSelect {
                expression: ty,
                name,
            })?;
            ty = self.parse_arguments(ty)?;
        }
        Ok(ty)
    }

    /// args := '<' type (',' type)* '>'
    fn parse_arguments(&mut self, raw: TreeId) -> Result<TreeId, TypeResolveError> {
        if !self.eat('<') {
            return Ok(raw);
        }
        let mut arguments = vec![self.parse_type()?];
        while self.eat(',') {
            arguments.push(self.parse_type()?);
        }
        if !self.eat('>') {
            return Err(self.error("expected `>`"));
        }
        self.arena
            .alloc(TreeKind::ParameterizedType { raw, arguments })
    }
}

impl TreeArena {
    /// Parse a type expression into trees.
    ///
    /// Dotted names become member selects over an identifier, so
    /// `java.util.List` selects `List` from `java.util`. Type arguments may
    /// appear on any segment: `Outer<String>.Inner`.
    ///
    /// # Errors
    /// Returns an error if the text is not a well-formed type expression.
    pub fn parse_type(&mut self, text: &str) -> Result<TreeId, TypeResolveError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            text,
            tokens: &tokens,
            position: 0,
            arena: self,
        };
        let ty = parser.parse_type()?;
        if parser.position < tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn render(arena: &TreeArena, id: TreeId) -> String {
        match arena.kind(id).unwrap() {
            TreeKind::ArrayType { component } => format!("{}[]", render(arena, *component)),
            TreeKind::Wildcard { bound: None } => "?".to_owned(),
            TreeKind::Wildcard {
                bound: Some((WildcardBound::Extends, b)),
            } => format!("? extends {}", render(arena, *b)),
            TreeKind::Wildcard {
                bound: Some((WildcardBound::Super, b)),
            } => format!("? super {}", render(arena, *b)),
            TreeKind::ParameterizedType { raw, arguments } => {
                let args: Vec<String> = arguments.iter().map(|a| render(arena, *a)).collect();
                format!("{}<{}>", render(arena, *raw), args.join(", "))
            }
            TreeKind::MemberSelect { expression, name } => {
                format!("{}.{name}", render(arena, *expression))
            }
            TreeKind::Identifier { name } => name.clone(),
            TreeKind::PrimitiveType(kind) => kind.keyword().to_owned(),
            other => format!("<{}>", other.label()),
        }
    }

    fn parse(text: &str) -> String {
        let mut arena = TreeArena::new();
        let id = arena.parse_type(text).unwrap();
        render(&arena, id)
    }

    #[test]
    fn primitives_and_arrays() {
        assert_eq!(parse("int"), "int");
        assert_eq!(parse("byte[][]"), "byte[][]");
    }

    #[test]
    fn qualified_names_are_member_selects() {
        let mut arena = TreeArena::new();
        let id = arena.parse_type("java.util.List").unwrap();
        let TreeKind::MemberSelect { expression, name } = arena.kind(id).unwrap() else {
            panic!("expected member select");
        };
        assert_eq!(name, "List");
        assert_eq!(render(&arena, *expression), "java.util");
    }

    #[test]
    fn generics_and_wildcards() {
        assert_eq!(
            parse("java.util.Map<String,? extends List<T>>"),
            "java.util.Map<String, ? extends List<T>>"
        );
        assert_eq!(parse("Comparable<? super T>"), "Comparable<? super T>");
        assert_eq!(parse("List<?>"), "List<?>");
    }

    #[test]
    fn arguments_on_outer_segment() {
        assert_eq!(parse("Outer<String>.Inner"), "Outer<String>.Inner");
    }

    #[test]
    fn malformed_input_rejected() {
        let mut arena = TreeArena::new();
        for text in ["", "List<", "List<>", "int[", "a..b", "Map<K V>", "x y", "a-b"] {
            assert!(arena.parse_type(text).is_err(), "accepted {text:?}");
        }
    }

    proptest! {
        /// Arbitrary input must never cause the parser to panic.
        #[test]
        fn parse_never_panics(text in "\\PC{0,40}") {
            let mut arena = TreeArena::new();
            let _ = arena.parse_type(&text);
        }
    }
}
