use super::token::*;
use super::Error;

type Result<T> = std::result::Result<T, Error>;

/// Split one source line into its optional line number and tokens.
/// Everything after `REM` or `'` is dropped.
pub fn lex(s: &str) -> Result<(Option<u16>, Vec<Token>)> {
    let trimmed = s.trim_start();
    let digits = trimmed
        .find(|c: char| !is_basic_digit(c))
        .unwrap_or_else(|| trimmed.len());
    let mut line_number = None;
    let mut rest = trimmed;
    if digits > 0 {
        match trimmed[..digits].parse::<u16>() {
            Ok(n) => line_number = Some(n),
            Err(_) => return Err(error!(Overflow; "INVALID LINE NUMBER")),
        }
        rest = &trimmed[digits..];
    }
    let tokens = BasicLexer {
        chars: rest.chars().peekable(),
        pending: None,
        remark: false,
    }
    .collect::<Result<Vec<Token>>>()?;
    Ok((line_number, tokens))
}

fn is_basic_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r'
}

fn is_basic_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_basic_alphabetic(c: char) -> bool {
    c.is_ascii_alphabetic()
}

trait Tokenizers<'a> {
    fn chars(&mut self) -> &mut std::iter::Peekable<std::str::Chars<'a>>;

    fn number(&mut self) -> Result<Token> {
        let mut s = String::new();
        let mut fraction = false;
        while let Some(&ch) = self.chars().peek() {
            if is_basic_digit(ch) {
                s.push(ch);
            } else if ch == '.' && !fraction {
                fraction = true;
                s.push(ch);
            } else {
                break;
            }
            self.chars().next();
        }
        let is_float = match s.find('.') {
            Some(dot) => s[dot + 1..].starts_with(|c: char| is_basic_digit(c)),
            None => false,
        };
        if !is_float {
            let s = s.trim_end_matches('.');
            if let Ok(n) = s.parse::<i16>() {
                return Ok(Token::Integer(n));
            }
        }
        match s.parse::<f32>() {
            Ok(n) => Ok(Token::Float(n)),
            Err(_) => Err(error!(SyntaxError; format!("BAD NUMBER {}", s))),
        }
    }

    fn string(&mut self) -> Result<Token> {
        let mut s = String::new();
        self.chars().next();
        loop {
            match self.chars().next() {
                Some('"') => return Ok(Token::String(s)),
                Some('\\') => match self.chars().next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(ch) => {
                        s.push('\\');
                        s.push(ch);
                    }
                    None => break,
                },
                Some(ch) => s.push(ch),
                None => break,
            }
        }
        Err(error!(SyntaxError; "UNTERMINATED STRING"))
    }

    fn alphabetic(&mut self) -> String {
        let mut s = String::new();
        while let Some(&ch) = self.chars().peek() {
            if is_basic_alphabetic(ch) || is_basic_digit(ch) {
                s.push(ch);
                self.chars().next();
            } else {
                break;
            }
        }
        if let Some('$') = self.chars().peek() {
            s.push('$');
            self.chars().next();
        }
        s
    }

    fn minutia(&mut self) -> Result<Token> {
        let ch = match self.chars().next() {
            Some(ch) => ch,
            None => return Err(error!(InternalError; "LEXER OVERRUN")),
        };
        let next = self.chars().peek().copied();
        let pair = match (ch, next) {
            ('<', Some('=')) => Some(Operator::LessEqual),
            ('<', Some('>')) => Some(Operator::NotEqual),
            ('>', Some('=')) => Some(Operator::GreaterEqual),
            _ => None,
        };
        if let Some(op) = pair {
            self.chars().next();
            return Ok(Token::Operator(op));
        }
        use Operator::*;
        match ch {
            '+' => Ok(Token::Operator(Plus)),
            '-' => Ok(Token::Operator(Minus)),
            '*' => Ok(Token::Operator(Multiply)),
            '/' => Ok(Token::Operator(Divide)),
            '\\' => Ok(Token::Operator(DivideInt)),
            '^' => Ok(Token::Operator(Caret)),
            '=' => Ok(Token::Operator(Equal)),
            '<' => Ok(Token::Operator(Less)),
            '>' => Ok(Token::Operator(Greater)),
            '(' => Ok(Token::LParen),
            ')' => Ok(Token::RParen),
            ',' => Ok(Token::Comma),
            ':' => Ok(Token::Colon),
            ';' => Ok(Token::Semicolon),
            '?' => Ok(Token::Word(Word::Print)),
            _ => Err(error!(SyntaxError; format!("UNEXPECTED {:?}", ch))),
        }
    }
}

struct BasicLexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    pending: Option<Token>,
    remark: bool,
}

impl<'a> Tokenizers<'a> for BasicLexer<'a> {
    fn chars(&mut self) -> &mut std::iter::Peekable<std::str::Chars<'a>> {
        &mut self.chars
    }
}

impl<'a> Iterator for BasicLexer<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(Ok(token));
        }
        while let Some(pk) = self.chars.peek() {
            if !is_basic_whitespace(*pk) {
                break;
            }
            self.chars.next();
        }
        if self.remark {
            return None;
        }
        let pk = *self.chars.peek()?;
        if is_basic_digit(pk) || pk == '.' {
            return Some(self.number());
        }
        if pk == '"' {
            return Some(self.string());
        }
        if pk == '\'' {
            self.remark = true;
            return None;
        }
        if is_basic_alphabetic(pk) {
            let word = self.alphabetic();
            let upper = word.to_ascii_uppercase();
            if let Some(token) = Token::from_keyword(&upper) {
                if token == Token::Word(Word::Rem) {
                    self.remark = true;
                    return None;
                }
                return Some(Ok(token));
            }
            if upper.len() > 2 && upper.starts_with("FN") {
                self.pending = Some(Token::Ident(word[2..].to_string()));
                return Some(Ok(Token::Word(Word::Fn)));
            }
            return Some(Ok(Token::Ident(word)));
        }
        Some(self.minutia())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        lex(s).unwrap().1
    }

    #[test]
    fn test_line_number() {
        let (n, t) = lex("10 PRINT 1").unwrap();
        assert_eq!(n, Some(10));
        assert_eq!(t, vec![Token::Word(Word::Print), Token::Integer(1)]);
        let (n, _) = lex("PRINT").unwrap();
        assert_eq!(n, None);
        assert!(lex("99999 END").is_err());
    }

    #[test]
    fn test_numbers() {
        let p = Token::Word(Word::Print);
        assert_eq!(tokens("PRINT 1.5"), vec![p.clone(), Token::Float(1.5)]);
        assert_eq!(tokens("PRINT .5"), vec![p.clone(), Token::Float(0.5)]);
        assert_eq!(tokens("PRINT 7."), vec![p, Token::Integer(7)]);
        assert_eq!(
            tokens("x=40000"),
            vec![
                Token::Ident("x".into()),
                Token::Operator(Operator::Equal),
                Token::Float(40000.0)
            ]
        );
    }

    #[test]
    fn test_keywords_upper_idents_keep_case() {
        assert_eq!(
            tokens("print Total$"),
            vec![Token::Word(Word::Print), Token::Ident("Total$".into())]
        );
        assert_eq!(
            tokens("a mod b"),
            vec![
                Token::Ident("a".into()),
                Token::Operator(Operator::Modulus),
                Token::Ident("b".into())
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""A\tB\n\"Q\"\\""#),
            vec![Token::String("A\tB\n\"Q\"\\".into())]
        );
        assert!(lex("PRINT \"OOPS").is_err());
    }

    #[test]
    fn test_remarks() {
        assert_eq!(tokens("REM anything: PRINT"), vec![]);
        assert_eq!(tokens("CLS ' clear it"), vec![Token::Word(Word::Cls)]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            tokens("<> <= >= < >"),
            vec![
                Token::Operator(Operator::NotEqual),
                Token::Operator(Operator::LessEqual),
                Token::Operator(Operator::GreaterEqual),
                Token::Operator(Operator::Less),
                Token::Operator(Operator::Greater),
            ]
        );
    }

    #[test]
    fn test_fn_prefix() {
        assert_eq!(
            tokens("FNsq(3)"),
            vec![
                Token::Word(Word::Fn),
                Token::Ident("sq".into()),
                Token::LParen,
                Token::Integer(3),
                Token::RParen
            ]
        );
    }
}
