use crate::parser::token::Location;
use crate::parser::token::Token;
use crate::parser::token::TokenKind;
use anyhow::Result;

pub struct Scanner {
    source: Vec<char>,
    text: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: String) -> Self {
        Scanner {
            source: source.chars().collect(),
            text: source,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 0,
            column: 0,
        }
    }
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
    fn advance(&mut self) -> char {
        let c = self.peek();
        self.current += 1;
        self.column += 1;
        c
    }
    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }
    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }
    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = if kind == TokenKind::Eof {
            "".to_string()
        } else {
            self.lexeme()
        };
        let diff = self.current - self.start;
        let column = self.column.saturating_sub(diff);
        let location = Location::new(self.line, column, self.start);
        self.tokens.push(Token::new(kind, lexeme, location));
    }
    fn number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        self.add_token(TokenKind::Integer);
        Ok(())
    }
    // Whether the character is a valid identifier start character.
    fn is_identifier_start(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == '@'
    }
    // Whether the character is a valid identifier character.
    fn is_identifier(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c.is_ascii_digit()
    }
    // Scan identifiers and keywords.
    fn identifier(&mut self) -> Result<()> {
        while Scanner::is_identifier(self.peek()) {
            self.advance();
        }
        let lexeme = self.lexeme();
        let kind = if lexeme.starts_with('@') {
            TokenKind::AtIdentifier
        } else {
            TokenKind::BareIdentifier
        };
        self.add_token(kind);
        Ok(())
    }
    fn arrow_or_minus(&mut self) -> Result<()> {
        if self.peek() == '>' {
            self.advance();
            self.add_token(TokenKind::Arrow);
        } else {
            self.add_token(TokenKind::Minus);
        }
        Ok(())
    }
    fn equal(&mut self) -> Result<()> {
        if self.peek() == '=' {
            self.advance();
            self.add_token(TokenKind::EqualEqual);
        } else {
            self.add_token(TokenKind::Equal);
        }
        Ok(())
    }
    fn comment(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }
    fn string(&mut self) -> Result<()> {
        while self.peek() != '"' && self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
        if self.peek() != '"' {
            let location = Location::new(self.line, self.column, self.start);
            return Err(anyhow::anyhow!(Self::error(
                &self.text,
                &location,
                "Unterminated string"
            )));
        }
        self.advance();
        self.add_token(TokenKind::String);
        Ok(())
    }
    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LParen),
            ')' => self.add_token(TokenKind::RParen),
            '{' => self.add_token(TokenKind::LBrace),
            '}' => self.add_token(TokenKind::RBrace),
            ':' => self.add_token(TokenKind::Colon),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            '#' => self.add_token(TokenKind::Hash),
            '+' => self.add_token(TokenKind::Plus),
            '*' => self.add_token(TokenKind::Star),
            '?' => self.add_token(TokenKind::Question),
            '>' => self.add_token(TokenKind::Greater),
            '<' => self.add_token(TokenKind::Less),
            ' ' | '\r' | '\t' => (),
            '\n' => {
                self.line += 1;
                self.column = 0;
            }
            '/' if self.peek() == '/' => self.comment(),
            '=' => self.equal()?,
            '-' => self.arrow_or_minus()?,
            '"' => self.string()?,
            s if s.is_ascii_digit() => self.number()?,
            s if Scanner::is_identifier_start(s) => self.identifier()?,
            _ => {
                let column = if self.column == 0 { 0 } else { self.column - 1 };
                let location = Location::new(self.line, column, self.start);
                return Err(anyhow::anyhow!(Self::error(
                    &self.text,
                    &location,
                    &format!("Scanning failed starting at: {}", c)
                )));
            }
        }
        Ok(())
    }
    fn scan_tokens(&mut self) -> Result<()> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.start = self.current;
        self.add_token(TokenKind::Eof);
        Ok(())
    }
    pub fn scan(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src.to_string());
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    pub fn error(src: &str, loc: &Location, msg: &str) -> String {
        let lines = src.split('\n').collect::<Vec<&str>>();
        let n = loc.line().min(lines.len().saturating_sub(1));
        let prev_line = if n > 0 {
            let prev_n = n - 1;
            let prev = lines[prev_n];
            format!("\n{prev_n}  | {prev}")
        } else {
            "".to_string()
        };
        let line = lines.get(n).copied().unwrap_or("");
        let line_num_width = 4 + n.to_string().len();
        let err_indent = " ".repeat(loc.column() + line_num_width);
        format!("```{prev_line}\n{n}  | {line}\n{err_indent}^ {msg}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner() {
        let tokens = Scanner::scan("@SharedMutable class Counter").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].kind, TokenKind::AtIdentifier);
        assert_eq!(tokens[0].lexeme, "@SharedMutable");
        assert_eq!(tokens[1].kind, TokenKind::BareIdentifier);
        assert_eq!(tokens[1].lexeme, "class");
        assert_eq!(tokens[2].lexeme, "Counter");
        assert_eq!(tokens[2].column(), 21);
        assert_eq!(tokens[3].kind, TokenKind::Eof);

        let tokens = Scanner::scan("this.#n_delegate == -42").unwrap();
        let kinds = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                TokenKind::BareIdentifier,
                TokenKind::Dot,
                TokenKind::Hash,
                TokenKind::BareIdentifier,
                TokenKind::EqualEqual,
                TokenKind::Minus,
                TokenKind::Integer,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[3].lexeme, "n_delegate");

        let tokens = Scanner::scan("return@inc STMContext.() -> T?").unwrap();
        assert_eq!(tokens[0].lexeme, "return");
        assert_eq!(tokens[1].kind, TokenKind::AtIdentifier);
        assert_eq!(tokens[1].lexeme, "@inc");
        assert_eq!(tokens[6].kind, TokenKind::Arrow);
        assert_eq!(tokens[8].kind, TokenKind::Question);

        let tokens = Scanner::scan("x = \"hello\" // trailing\ny").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Equal);
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].lexeme, "\"hello\"");
        assert_eq!(tokens[3].lexeme, "y");
        assert_eq!(tokens[3].line(), 1);
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn test_error() {
        let src = "module @m {\n  fun f(): Unit $\n}";
        let err = Scanner::scan(src).unwrap_err().to_string();
        let lines = err.split('\n').collect::<Vec<&str>>();
        assert_eq!(lines[0], "```");
        assert_eq!(lines[1], "0  | module @m {");
        assert_eq!(lines[2], "1  |   fun f(): Unit $");
        let expected = format!("{}^ Scanning failed starting at: $", " ".repeat(21));
        assert_eq!(lines[3], expected);
        assert_eq!(lines[4], "```");
    }
}
