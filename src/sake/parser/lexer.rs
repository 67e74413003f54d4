//! A tokenizer for the ruby-flavoured definition files.
//!
//! It only knows enough of the language to keep block boundaries honest:
//! every string-like construct (quotes, heredocs, `%` literals, regexes,
//! comments) is consumed whole so that an `end` or a `}` inside one never
//! reaches the parser.

use crate::interlude::*;

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifiers, keywords, constants and sigiled variables.
    Ident(String),
    Str {
        value: String,
        interpolated: bool,
    },
    Sym(String),
    /// `name:` style hash keys.
    Label(String),
    /// Backtick and `%x` shell commands.
    Command,
    /// Numbers, regexes, heredocs and other literals whose value the
    /// parser never needs.
    Literal,
    /// `=>`
    Arrow,
    /// `::`
    Scope,
    Punct(char),
    Newline,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    /// Byte offsets into the source.
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match &self.tok {
            Tok::Ident(id) => format!("`{id}`"),
            Tok::Str { value, .. } => format!("string {value:?}"),
            Tok::Sym(sym) => format!("symbol :{sym}"),
            Tok::Label(label) => format!("`{label}:`"),
            Tok::Command => "shell command".into(),
            Tok::Literal => "literal".into(),
            Tok::Arrow => "`=>`".into(),
            Tok::Scope => "`::`".into(),
            Tok::Punct(ch) => format!("`{ch}`"),
            Tok::Newline => "end of line".into(),
        }
    }
}

struct Heredoc {
    term: String,
    indented: bool,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    heredocs: Vec<Heredoc>,
    tokens: Vec<Token>,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        heredocs: vec![],
        tokens: vec![],
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

fn is_ident_start(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphabetic() || byte >= 0x80
}

fn is_ident_char(byte: u8) -> bool {
    is_ident_start(byte) || byte.is_ascii_digit()
}

fn is_delim(byte: u8) -> bool {
    byte.is_ascii() && !byte.is_ascii_alphanumeric() && byte != b' '
}

fn closing_delim(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    }
}

/// Keywords after which an expression, not an operator, is expected.
const EXPR_KEYWORDS: &[&str] = &[
    "if", "elsif", "unless", "while", "until", "and", "or", "not", "when", "return", "case", "in",
    "then", "do", "else", "begin",
];

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.bytes[self.pos - 1] == b'\n'
    }

    fn push(&mut self, tok: Tok, start: usize, line: usize) {
        self.tokens.push(Token {
            tok,
            start,
            end: self.pos,
            line,
        });
    }

    fn syntax(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Whether the previous token ends an operand, which makes a
    /// following `/` or `%` an operator instead of a literal.
    fn prev_is_value(&self) -> bool {
        match self.tokens.last().map(|tok| &tok.tok) {
            Some(Tok::Ident(id)) => !EXPR_KEYWORDS.contains(&&id[..]),
            Some(Tok::Str { .. } | Tok::Sym(_) | Tok::Literal | Tok::Command) => true,
            Some(Tok::Punct(')' | ']' | '}')) => true,
            _ => false,
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(byte) = self.peek(0) {
            let start = self.pos;
            let line = self.line;
            match byte {
                b' ' | b'\t' | b'\r' | 0x0c => self.pos += 1,
                b'\\' if self.peek(1) == Some(b'\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                b'\\' if self.peek(1) == Some(b'\r') && self.peek(2) == Some(b'\n') => {
                    self.pos += 3;
                    self.line += 1;
                }
                b'\n' => {
                    self.pos += 1;
                    self.push(Tok::Newline, start, line);
                    self.line += 1;
                    if !self.heredocs.is_empty() {
                        self.heredoc_bodies(line)?;
                    }
                }
                b'#' => {
                    while !matches!(self.peek(0), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                b'=' if self.at_line_start() && self.src[self.pos..].starts_with("=begin") => {
                    self.block_comment(line)?;
                }
                b'_' if self.at_line_start() && self.rest_of_line().trim_end() == "__END__" => {
                    break;
                }
                b'\'' => {
                    self.pos += 1;
                    let value = self.single_quoted(b'\'', line)?;
                    self.push(
                        Tok::Str {
                            value,
                            interpolated: false,
                        },
                        start,
                        line,
                    );
                }
                b'"' => {
                    self.pos += 1;
                    let (value, interpolated) = self.double_quoted(b'"', b'"', line)?;
                    self.push(Tok::Str { value, interpolated }, start, line);
                }
                b'`' => {
                    self.pos += 1;
                    self.double_quoted(b'`', b'`', line)?;
                    self.push(Tok::Command, start, line);
                }
                b':' => self.colon(start, line)?,
                b'@' | b'$' => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(|b| is_ident_char(b) || b == b'@') {
                        self.pos += 1;
                    }
                    let ident = self.src[start..self.pos].to_owned();
                    self.push(Tok::Ident(ident), start, line);
                }
                b if is_ident_start(b) => self.ident(start, line),
                b if b.is_ascii_digit() => {
                    while self.peek(0).is_some_and(|b| is_ident_char(b))
                        || (self.peek(0) == Some(b'.')
                            && self.peek(1).is_some_and(|b| b.is_ascii_digit()))
                    {
                        self.pos += 1;
                    }
                    self.push(Tok::Literal, start, line);
                }
                b'=' if self.peek(1) == Some(b'>') => {
                    self.pos += 2;
                    self.push(Tok::Arrow, start, line);
                }
                b'%' if !self.prev_is_value() => {
                    if !self.percent_literal(start, line)? {
                        self.pos += 1;
                        self.push(Tok::Punct('%'), start, line);
                    }
                }
                b'/' if !self.prev_is_value() => {
                    if self.regex_literal() {
                        self.push(Tok::Literal, start, line);
                    } else {
                        self.pos += 1;
                        self.push(Tok::Punct('/'), start, line);
                    }
                }
                b'<' if self.peek(1) == Some(b'<') => {
                    if self.heredoc_head()? {
                        self.push(Tok::Literal, start, line);
                    } else {
                        self.pos += 1;
                        self.push(Tok::Punct('<'), start, line);
                    }
                }
                _ => {
                    let ch = self.src[self.pos..]
                        .chars()
                        .next()
                        .expect_or_log("lexer position must be on a char boundary");
                    self.pos += ch.len_utf8();
                    self.push(Tok::Punct(ch), start, line);
                }
            }
        }
        if let Some(doc) = self.heredocs.first() {
            return Err(self.syntax(
                self.line,
                format!("unterminated heredoc, missing `{}`", doc.term),
            ));
        }
        Ok(())
    }

    fn rest_of_line(&self) -> &'a str {
        let rest = &self.src[self.pos..];
        match rest.find('\n') {
            Some(idx) => &rest[..idx],
            None => rest,
        }
    }

    fn skip_line(&mut self) {
        while let Some(byte) = self.peek(0) {
            self.pos += 1;
            if byte == b'\n' {
                self.line += 1;
                break;
            }
        }
    }

    fn block_comment(&mut self, line: usize) -> Result<(), ParseError> {
        loop {
            self.skip_line();
            if self.peek(0).is_none() {
                return Err(self.syntax(line, "unterminated `=begin` comment"));
            }
            if self.src[self.pos..].starts_with("=end") {
                while !matches!(self.peek(0), None | Some(b'\n')) {
                    self.pos += 1;
                }
                return Ok(());
            }
        }
    }

    fn ident(&mut self, start: usize, line: usize) {
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        // predicate and bang methods, but not `a!=b` or `a?b:c`
        if matches!(self.peek(0), Some(b'?' | b'!')) && self.peek(1) != Some(b'=') {
            let after = self.peek(1);
            if !after.is_some_and(is_ident_char) && after != Some(b':') {
                self.pos += 1;
            }
        }
        let ident = self.src[start..self.pos].to_owned();
        if self.peek(0) == Some(b':') && self.peek(1) != Some(b':') {
            self.pos += 1;
            self.push(Tok::Label(ident), start, line);
        } else {
            self.push(Tok::Ident(ident), start, line);
        }
    }

    fn colon(&mut self, start: usize, line: usize) -> Result<(), ParseError> {
        match self.peek(1) {
            Some(b':') => {
                self.pos += 2;
                self.push(Tok::Scope, start, line);
            }
            Some(b'"') => {
                self.pos += 2;
                let (value, _) = self.double_quoted(b'"', b'"', line)?;
                self.push(Tok::Sym(value), start, line);
            }
            Some(b'\'') => {
                self.pos += 2;
                let value = self.single_quoted(b'\'', line)?;
                self.push(Tok::Sym(value), start, line);
            }
            Some(b) if is_ident_start(b) || b == b'@' || b == b'$' => {
                self.pos += 1;
                let name_start = self.pos;
                while self.peek(0).is_some_and(|b| is_ident_char(b) || b == b'@' || b == b'$') {
                    self.pos += 1;
                }
                if matches!(self.peek(0), Some(b'?' | b'!' | b'=')) && self.peek(1) != Some(b'>')
                {
                    self.pos += 1;
                }
                let value = self.src[name_start..self.pos].to_owned();
                self.push(Tok::Sym(value), start, line);
            }
            // operator symbols like :+ or :[]=, never names
            Some(b'+' | b'-' | b'*' | b'/' | b'<' | b'>' | b'=' | b'!' | b'[' | b'%' | b'~')
                if !self.prev_is_value() =>
            {
                self.pos += 1;
                while self
                    .peek(0)
                    .is_some_and(|b| b"+-*/<>=![]%~".contains(&b))
                {
                    self.pos += 1;
                }
                self.push(Tok::Literal, start, line);
            }
            _ => {
                self.pos += 1;
                self.push(Tok::Punct(':'), start, line);
            }
        }
        Ok(())
    }

    /// Reads up to the `close` delimiter with single quote escaping
    /// rules: only the delimiter and the backslash can be escaped.
    fn single_quoted(&mut self, close: u8, line: usize) -> Result<String, ParseError> {
        let mut value = String::new();
        let mut seg_start = self.pos;
        loop {
            let Some(byte) = self.peek(0) else {
                return Err(self.syntax(line, "unterminated string"));
            };
            match byte {
                b'\\' if matches!(self.peek(1), Some(b) if b == close || b == b'\\') => {
                    value.push_str(&self.src[seg_start..self.pos]);
                    value.push(self.bytes[self.pos + 1] as char);
                    self.pos += 2;
                    seg_start = self.pos;
                }
                b if b == close => {
                    value.push_str(&self.src[seg_start..self.pos]);
                    self.pos += 1;
                    return Ok(value);
                }
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Reads up to `close` with double quote escaping rules, skipping
    /// over any `#{}` interpolations. Returns the value and whether it
    /// interpolates anything.
    fn double_quoted(
        &mut self,
        open: u8,
        close: u8,
        line: usize,
    ) -> Result<(String, bool), ParseError> {
        let mut value = String::new();
        let mut interpolated = false;
        let mut depth = 0usize;
        loop {
            let Some(byte) = self.peek(0) else {
                return Err(self.syntax(line, "unterminated string"));
            };
            match byte {
                b'\\' => {
                    let Some(next) = self.src[self.pos + 1..].chars().next() else {
                        return Err(self.syntax(line, "unterminated string"));
                    };
                    self.pos += 1 + next.len_utf8();
                    match next {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        's' => value.push(' '),
                        '0' => value.push('\0'),
                        'e' => value.push('\x1b'),
                        'a' => value.push('\x07'),
                        'b' => value.push('\x08'),
                        'f' => value.push('\x0c'),
                        'v' => value.push('\x0b'),
                        '\n' => self.line += 1,
                        other => value.push(other),
                    }
                }
                b'#' if self.peek(1) == Some(b'{') => {
                    interpolated = true;
                    self.pos += 2;
                    self.interpolation(line)?;
                }
                b if b == close && depth == 0 => {
                    self.pos += 1;
                    return Ok((value, interpolated));
                }
                b => {
                    if open != close {
                        if b == open {
                            depth += 1;
                        } else if b == close {
                            depth -= 1;
                        }
                    }
                    if b == b'\n' {
                        self.line += 1;
                    }
                    let ch = self.src[self.pos..]
                        .chars()
                        .next()
                        .expect_or_log("lexer position must be on a char boundary");
                    self.pos += ch.len_utf8();
                    value.push(ch);
                }
            }
        }
    }

    /// Skips the code inside a `#{}`, the opening brace already consumed.
    fn interpolation(&mut self, line: usize) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            let Some(byte) = self.peek(0) else {
                return Err(self.syntax(line, "unterminated string interpolation"));
            };
            match byte {
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    self.pos += 1;
                }
                b'\'' => {
                    self.pos += 1;
                    self.single_quoted(b'\'', line)?;
                }
                b'"' => {
                    self.pos += 1;
                    self.double_quoted(b'"', b'"', line)?;
                }
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        Ok(())
    }

    /// `%w[]`, `%q()`, `%()` and friends. Returns false when the `%` is
    /// not followed by a literal and should be lexed as an operator.
    fn percent_literal(&mut self, start: usize, line: usize) -> Result<bool, ParseError> {
        let (kind, delim_at) = match (self.peek(1), self.peek(2)) {
            (Some(kind), Some(delim)) if b"qQwWiIrsx".contains(&kind) && !delim.is_ascii() => {
                return Err(self.syntax(line, "%-literal delimiters must be ascii"));
            }
            (Some(kind), Some(delim)) if b"qQwWiIrsx".contains(&kind) && is_delim(delim) => {
                (Some(kind), 2)
            }
            (Some(delim), _) if b"([{<|!/^".contains(&delim) => (None, 1),
            _ => return Ok(false),
        };
        let open = self.bytes[self.pos + delim_at];
        let close = closing_delim(open);
        self.pos += delim_at + 1;
        let (value, interpolated) = if kind == Some(b'q')
            || kind == Some(b'w')
            || kind == Some(b'i')
            || kind == Some(b's')
        {
            if open == close {
                (self.single_quoted(close, line)?, false)
            } else {
                self.double_quoted(open, close, line)?
            }
        } else {
            self.double_quoted(open, close, line)?
        };
        let tok = match kind {
            Some(b'x') => Tok::Command,
            None | Some(b'q' | b'Q') => Tok::Str {
                value,
                interpolated,
            },
            _ => Tok::Literal,
        };
        self.push(tok, start, line);
        Ok(true)
    }

    /// Consumes a `/regex/flags` literal if one closes on this line.
    fn regex_literal(&mut self) -> bool {
        let mut idx = self.pos + 1;
        while let Some(&byte) = self.bytes.get(idx) {
            match byte {
                b'\\' => idx += 2,
                b'\n' => return false,
                b'/' => {
                    idx += 1;
                    while self.bytes.get(idx).is_some_and(|b| b.is_ascii_alphabetic()) {
                        idx += 1;
                    }
                    self.pos = idx;
                    return true;
                }
                _ => idx += 1,
            }
        }
        false
    }

    /// `<<~EOS`, `<<-EOS`, `<<EOS` and quoted variants. Bodies are
    /// consumed when the current line ends.
    fn heredoc_head(&mut self) -> Result<bool, ParseError> {
        let mut idx = self.pos + 2;
        let indented = matches!(self.bytes.get(idx), Some(b'~' | b'-'));
        if indented {
            idx += 1;
        }
        let term = match self.bytes.get(idx) {
            Some(&quote @ (b'\'' | b'"' | b'`')) => {
                let rest = &self.src[idx + 1..];
                let Some(len) = rest.find(quote as char) else {
                    return Ok(false);
                };
                let term = rest[..len].to_owned();
                idx += len + 2;
                term
            }
            Some(&b) if b.is_ascii_uppercase() || (indented && is_ident_start(b)) => {
                let begin = idx;
                while self.bytes.get(idx).is_some_and(|b| is_ident_char(*b)) {
                    idx += 1;
                }
                self.src[begin..idx].to_owned()
            }
            _ => return Ok(false),
        };
        if term.is_empty() || term.contains('\n') {
            return Ok(false);
        }
        self.pos = idx;
        self.heredocs.push(Heredoc { term, indented });
        Ok(true)
    }

    fn heredoc_bodies(&mut self, line: usize) -> Result<(), ParseError> {
        for doc in std::mem::take(&mut self.heredocs) {
            loop {
                if self.peek(0).is_none() {
                    return Err(self.syntax(
                        line,
                        format!("unterminated heredoc, missing `{}`", doc.term),
                    ));
                }
                let content = self.rest_of_line().trim_end_matches('\r');
                let is_term = if doc.indented {
                    content.trim() == doc.term
                } else {
                    content == doc.term
                };
                self.skip_line();
                if is_term {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|tok| tok.tok)
            .collect()
    }

    fn str_tok(value: &str) -> Tok {
        Tok::Str {
            value: value.into(),
            interpolated: false,
        }
    }

    #[test]
    fn declaration_line() {
        assert_eq!(
            toks("task 'db:seed', :count, :needs => [ \"a\" ] do |t, args|"),
            vec![
                Tok::Ident("task".into()),
                str_tok("db:seed"),
                Tok::Punct(','),
                Tok::Sym("count".into()),
                Tok::Punct(','),
                Tok::Sym("needs".into()),
                Tok::Arrow,
                Tok::Punct('['),
                str_tok("a"),
                Tok::Punct(']'),
                Tok::Ident("do".into()),
                Tok::Punct('|'),
                Tok::Ident("t".into()),
                Tok::Punct(','),
                Tok::Ident("args".into()),
                Tok::Punct('|'),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(toks(r"'it\'s a \n'"), vec![str_tok("it's a \\n")]);
        assert_eq!(toks(r#""tab\there \"q\"""#), vec![str_tok("tab\there \"q\"")]);
        assert_eq!(
            toks(r#""hi #{name.upcase + "}"}""#),
            vec![Tok::Str {
                value: "hi ".into(),
                interpolated: true
            }]
        );
    }

    #[test]
    fn labels_symbols_and_scopes() {
        assert_eq!(
            toks("task default: [:test] ; Rake::Task"),
            vec![
                Tok::Ident("task".into()),
                Tok::Label("default".into()),
                Tok::Punct('['),
                Tok::Sym("test".into()),
                Tok::Punct(']'),
                Tok::Punct(';'),
                Tok::Ident("Rake".into()),
                Tok::Scope,
                Tok::Ident("Task".into()),
            ]
        );
        assert_eq!(toks(":'odd name'"), vec![Tok::Sym("odd name".into())]);
        assert_eq!(
            toks("a ? b : c"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct('?'),
                Tok::Ident("b".into()),
                Tok::Punct(':'),
                Tok::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn comments_and_block_comments_vanish() {
        assert_eq!(
            toks("# end }\na # end\n=begin\nend }\n=end\nb"),
            vec![
                Tok::Newline,
                Tok::Ident("a".into()),
                Tok::Newline,
                Tok::Newline,
                Tok::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn heredoc_bodies_are_skipped() {
        let src = "x = <<~EOS\n  end\n  }\n  EOS\ny";
        assert_eq!(
            toks(src),
            vec![
                Tok::Ident("x".into()),
                Tok::Punct('='),
                Tok::Literal,
                Tok::Newline,
                Tok::Ident("y".into()),
            ]
        );
        let tokens = tokenize(src).unwrap();
        assert_eq!(tokens.last().unwrap().line, 5);
    }

    #[test]
    fn array_push_is_not_a_heredoc() {
        assert_eq!(
            toks("list << \"end\""),
            vec![
                Tok::Ident("list".into()),
                Tok::Punct('<'),
                Tok::Punct('<'),
                str_tok("end"),
            ]
        );
    }

    #[test]
    fn percent_and_regex_literals() {
        assert_eq!(
            toks("%w[a } end]\n%x(ls)\nx = /en}d/i\ny = a / b"),
            vec![
                Tok::Literal,
                Tok::Newline,
                Tok::Command,
                Tok::Newline,
                Tok::Ident("x".into()),
                Tok::Punct('='),
                Tok::Literal,
                Tok::Newline,
                Tok::Ident("y".into()),
                Tok::Punct('='),
                Tok::Ident("a".into()),
                Tok::Punct('/'),
                Tok::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn backticks_are_commands() {
        assert_eq!(toks("`rm -rf /`"), vec![Tok::Command]);
    }

    #[test]
    fn stops_at_data_section() {
        assert_eq!(
            toks("a\n__END__\ntask 'nope'"),
            vec![Tok::Ident("a".into()), Tok::Newline]
        );
    }

    #[test]
    fn multibyte_percent_delimiters_are_syntax_errors() {
        let err = tokenize("x = %q«abc«\ntask :a\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }), "{err:?}");
        // ascii punctuation still opens a literal
        assert_eq!(toks("%q|a|"), vec![Tok::Literal]);
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("a\nb = 'oops\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }), "{err:?}");
    }
}
