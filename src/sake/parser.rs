//! Reads definition files into [`TaskCollection`]s.
//!
//! Nothing in a definition file is ever evaluated. Declarations are
//! recognised syntactically and task bodies are lifted out as text.
//! Every other statement is skipped whole, refusing the ones that would
//! touch the filesystem, spawn processes or reach the network had the
//! file been run.

use crate::interlude::*;

use std::time::Duration;

use tokio::io::AsyncReadExt;

use crate::collection::TaskCollection;
use crate::task::Task;

mod lexer;

use lexer::{Tok, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unable to read definitions from {origin}: {reason}")]
    SourceUnavailable { origin: String, reason: String },
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("refusing {operation} on line {line} while reading definitions")]
    SandboxViolation { line: usize, operation: String },
    #[error("definition parse interrupted: {0}")]
    Interrupted(String),
}

/// Where definitions are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    Url(url::Url),
    File(PathBuf),
}

impl Source {
    /// `-` is stdin, http(s) urls are fetched, anything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else if let Some(url) = crate::utils::as_http_url(arg) {
            Self::Url(url)
        } else {
            Self::File(arg.into())
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Acquire the text of `source` and parse it off the async workers.
///
/// Files and urls must arrive within `timeout`. Stdin is read for as long
/// as it stays open since a person may be typing into it.
#[tracing::instrument(skip(timeout))]
pub async fn parse(source: &Source, timeout: Duration) -> Result<TaskCollection, ParseError> {
    let text = match source {
        Source::Stdin => read_source(source).await?,
        _ => match tokio::time::timeout(timeout, read_source(source)).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(ParseError::SourceUnavailable {
                    origin: source.to_string(),
                    reason: format!("timed out after {timeout:?}"),
                })
            }
        },
    };
    let tasks = parse_isolated(text, timeout).await?;
    debug!(count = tasks.len(), "parsed definitions");
    Ok(tasks)
}

/// Runs [`parse_str`] on a blocking worker so a panic or a runaway
/// parse can't take the caller down with it.
pub async fn parse_isolated(text: String, timeout: Duration) -> Result<TaskCollection, ParseError> {
    isolated(timeout, move || parse_str(&text)).await
}

/// A worker that outlives `timeout` is abandoned, not joined. The
/// runtime is shut down without waiting on it once the command ends.
async fn isolated<F>(timeout: Duration, job: F) -> Result<TaskCollection, ParseError>
where
    F: FnOnce() -> Result<TaskCollection, ParseError> + Send + 'static,
{
    let job = tokio::task::spawn_blocking(job);
    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(res)) => res,
        Ok(Err(err)) => Err(ParseError::Interrupted(format!("parser failed: {err}"))),
        Err(_) => Err(ParseError::Interrupted(format!(
            "parse did not finish within {timeout:?}"
        ))),
    }
}

async fn read_source(source: &Source) -> Result<String, ParseError> {
    let unavailable = |reason: String| ParseError::SourceUnavailable {
        origin: source.to_string(),
        reason,
    };
    match source {
        Source::Stdin => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .map_err(|err| unavailable(err.to_string()))?;
            Ok(text)
        }
        Source::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|err| unavailable(err.to_string())),
        Source::Url(url) => {
            let client = reqwest::Client::builder()
                .user_agent(concat!("sake/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|err| unavailable(err.to_string()))?;
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| unavailable(err.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(unavailable(format!("server responded with {status}")));
            }
            resp.text().await.map_err(|err| unavailable(err.to_string()))
        }
    }
}

/// Parse definition text into tasks.
pub fn parse_str(text: &str) -> Result<TaskCollection, ParseError> {
    let tokens = lexer::tokenize(text)?;
    let mut parser = Parser {
        src: text,
        tokens,
        pos: 0,
        namespace: vec![],
        comment: None,
        tasks: default(),
    };
    parser.statements(None)?;
    Ok(parser.tasks)
}

/// Calls refused outside of task bodies.
const DENIED: &[&str] = &[
    // process control
    "system", "exec", "spawn", "fork", "exit", "exit!", "abort", "sh", "ruby", "syscall", "trap",
    "at_exit", "Process", "Kernel", "Open3", "PTY",
    // filesystem
    "rm", "rm_f", "rm_r", "rm_rf", "rmdir", "rmtree", "mv", "cp", "cp_r", "mkdir", "mkdir_p",
    "makedirs", "touch", "chmod", "chmod_R", "chown", "chown_R", "ln", "ln_s", "ln_sf", "File",
    "FileUtils", "Dir", "IO", "Pathname", "Tempfile",
    // network
    "Net", "Socket", "TCPSocket", "UDPSocket", "TCPServer", "UNIXSocket", "URI", "open",
    // code loading
    "eval", "instance_eval", "class_eval", "module_eval",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    End,
    Brace,
    Paren,
    Bracket,
}

impl Closer {
    fn opener(self) -> &'static str {
        match self {
            Self::End => "block",
            Self::Brace => "`{`",
            Self::Paren => "`(`",
            Self::Bracket => "`[`",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    closer: Closer,
    line: usize,
    /// Code that only runs when called, like method and lambda bodies.
    inert: bool,
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    namespace: Vec<String>,
    comment: Option<String>,
    tasks: TaskCollection,
}

fn syntax(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.into(),
    }
}

fn violation(line: usize, operation: impl Into<String>) -> ParseError {
    ParseError::SandboxViolation {
        line,
        operation: operation.into(),
    }
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|token| &token.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|token| &token.tok)
    }

    fn prev_of(&self, idx: usize) -> Option<&Tok> {
        idx.checked_sub(1)
            .and_then(|prev| self.tokens.get(prev))
            .map(|token| &token.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map(|token| token.line)
            .unwrap_or(1)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        self.eat(&Tok::Punct(ch))
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some(token) => syntax(
                token.line,
                format!("unexpected {}, expected {expected}", token.describe()),
            ),
            None => syntax(self.line(), format!("unexpected end of file, expected {expected}")),
        }
    }

    fn expect_punct(&mut self, ch: char) -> Result<(), ParseError> {
        if self.eat_punct(ch) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{ch}`")))
        }
    }

    /// Whether the token at `idx` names something callable rather than
    /// a method on a receiver or a definition.
    fn is_bare(&self, idx: usize) -> bool {
        !matches!(self.prev_of(idx), Some(Tok::Punct('.') | Tok::Scope))
            && !matches!(self.prev_of(idx), Some(Tok::Ident(id)) if id == "def")
    }

    /// Whether an expression, not a modifier, starts at `idx`.
    fn is_expr_start(&self, idx: usize) -> bool {
        match self.prev_of(idx) {
            None | Some(Tok::Newline | Tok::Arrow | Tok::Label(_)) => true,
            Some(Tok::Punct(ch)) => "(;[{,=|!&?:".contains(*ch),
            Some(Tok::Ident(id)) => matches!(&id[..], "then" | "do" | "else" | "begin" | "ensure"),
            _ => false,
        }
    }

    fn closing(&self, idx: usize) -> Option<Closer> {
        match &self.tokens.get(idx)?.tok {
            Tok::Ident(id) if id == "end" && self.is_bare(idx) => Some(Closer::End),
            Tok::Punct('}') => Some(Closer::Brace),
            Tok::Punct(')') => Some(Closer::Paren),
            Tok::Punct(']') => Some(Closer::Bracket),
            _ => None,
        }
    }

    fn opening(&self, idx: usize, loop_header: &mut bool) -> Option<Frame> {
        let token = self.tokens.get(idx)?;
        let frame = |closer, inert| Frame {
            closer,
            line: token.line,
            inert,
        };
        let after_lambda = || match self.prev_of(idx) {
            Some(Tok::Ident(id)) => id == "lambda" || id == "proc",
            Some(Tok::Punct('>')) => matches!(self.prev_of(idx - 1), Some(Tok::Punct('-'))),
            _ => false,
        };
        match &token.tok {
            Tok::Punct('{') => Some(frame(Closer::Brace, after_lambda())),
            Tok::Punct('(') => Some(frame(Closer::Paren, false)),
            Tok::Punct('[') => Some(frame(Closer::Bracket, false)),
            Tok::Ident(id) if self.is_bare(idx) => match &id[..] {
                "def" => Some(frame(Closer::End, true)),
                "class" | "module" | "case" | "begin" => Some(frame(Closer::End, false)),
                "for" => {
                    *loop_header = true;
                    Some(frame(Closer::End, false))
                }
                "while" | "until" if self.is_expr_start(idx) => {
                    *loop_header = true;
                    Some(frame(Closer::End, false))
                }
                "if" | "unless" if self.is_expr_start(idx) => Some(frame(Closer::End, false)),
                "do" if *loop_header => {
                    *loop_header = false;
                    None
                }
                "do" => Some(frame(Closer::End, after_lambda())),
                _ => None,
            },
            _ => None,
        }
    }

    fn check_sandbox(&self, idx: usize) -> Result<(), ParseError> {
        let token = &self.tokens[idx];
        match &token.tok {
            Tok::Command => Err(violation(token.line, "shell command")),
            Tok::Ident(id)
                if DENIED.contains(&&id[..])
                    && self.is_bare(idx)
                    && self.tokens.get(idx + 1).map(|next| &next.tok) != Some(&Tok::Punct('=')) =>
            {
                Err(violation(token.line, format!("call to `{id}`")))
            }
            _ => Ok(()),
        }
    }

    /// Walks tokens from `start` keeping track of nesting.
    ///
    /// With an empty `stack` this skips one statement and returns the
    /// index of the token ending it, which is left unconsumed. Otherwise
    /// it returns the index of the token closing the bottom frame.
    fn walk(&self, start: usize, mut stack: Vec<Frame>, check: bool) -> Result<usize, ParseError> {
        let nested = !stack.is_empty();
        let mut loop_header = false;
        let mut idx = start;
        while let Some(token) = self.tokens.get(idx) {
            if !nested && stack.is_empty() {
                if matches!(token.tok, Tok::Newline | Tok::Punct(';'))
                    || self.closing(idx).is_some()
                {
                    return Ok(idx);
                }
            }
            if check && !stack.iter().any(|frame| frame.inert) {
                self.check_sandbox(idx)?;
            }
            if matches!(token.tok, Tok::Newline | Tok::Punct(';')) {
                loop_header = false;
            }
            if let Some(closer) = self.closing(idx) {
                let Some(frame) = stack.pop() else {
                    return Err(syntax(token.line, format!("unexpected {}", token.describe())));
                };
                if frame.closer != closer {
                    return Err(syntax(
                        token.line,
                        format!(
                            "unexpected {}, the {} opened on line {} is still open",
                            token.describe(),
                            frame.closer.opener(),
                            frame.line
                        ),
                    ));
                }
                if nested && stack.is_empty() {
                    return Ok(idx);
                }
            } else if let Some(frame) = self.opening(idx, &mut loop_header) {
                stack.push(frame);
            }
            idx += 1;
        }
        match stack.last() {
            Some(frame) => Err(syntax(
                frame.line,
                format!("the {} opened here is never closed", frame.closer.opener()),
            )),
            None => Ok(idx),
        }
    }

    /// Whether the current `task`/`desc`/`namespace` word is a call and
    /// not the start of something like `task.invoke` or `task = ..`.
    fn is_declaration(&self) -> bool {
        !matches!(self.peek_at(1), Some(Tok::Punct('.' | '=') | Tok::Scope))
    }

    fn statements(&mut self, closer: Option<Frame>) -> Result<(), ParseError> {
        loop {
            while matches!(self.peek(), Some(Tok::Newline | Tok::Punct(';'))) {
                self.pos += 1;
            }
            let Some(token) = self.tokens.get(self.pos).cloned() else {
                return match closer {
                    Some(frame) => Err(syntax(
                        frame.line,
                        "the namespace opened here is never closed",
                    )),
                    None => Ok(()),
                };
            };
            if let Some(found) = self.closing(self.pos) {
                return match closer {
                    Some(frame) if frame.closer == found => {
                        self.pos += 1;
                        Ok(())
                    }
                    _ => Err(syntax(token.line, format!("unexpected {}", token.describe()))),
                };
            }
            match &token.tok {
                Tok::Ident(id) if id == "namespace" && self.is_declaration() => self.namespace()?,
                Tok::Ident(id)
                    if (id == "desc" || id == "description") && self.is_declaration() =>
                {
                    self.description()?
                }
                Tok::Ident(id) if id == "task" && self.is_declaration() => self.task()?,
                _ => self.pos = self.walk(self.pos, vec![], true)?,
            }
        }
    }

    /// A string or symbol literal.
    fn name(&mut self, expected: &str) -> Result<String, ParseError> {
        let line = self.line();
        let name = match self.peek() {
            Some(Tok::Str {
                value,
                interpolated: false,
            })
            | Some(Tok::Sym(value)) => value.clone(),
            Some(Tok::Str {
                interpolated: true, ..
            }) => return Err(violation(line, "string interpolation")),
            Some(Tok::Command) => return Err(violation(line, "shell command")),
            _ => return Err(self.unexpected(expected)),
        };
        self.pos += 1;
        Ok(name)
    }

    fn name_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_punct('[')?;
        let mut names = vec![];
        loop {
            self.skip_newlines();
            if self.eat_punct(']') {
                break;
            }
            names.push(self.name("a name")?);
            self.skip_newlines();
            if !self.eat_punct(',') {
                self.skip_newlines();
                self.expect_punct(']')?;
                break;
            }
        }
        Ok(names)
    }

    fn dependencies(&mut self) -> Result<Vec<String>, ParseError> {
        self.skip_newlines();
        if self.peek() == Some(&Tok::Punct('[')) {
            self.name_list()
        } else {
            Ok(vec![self.name("a dependency")?])
        }
    }

    fn statement_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None | Some(Tok::Newline | Tok::Punct(';')) => Ok(()),
            _ if self.closing(self.pos).is_some() => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    /// Consumes a `do` or `{` opener along with any `|params|`.
    fn block_opener(&mut self) -> Result<Option<Frame>, ParseError> {
        let line = self.line();
        let closer = match self.peek() {
            Some(Tok::Ident(id)) if id == "do" => Closer::End,
            Some(Tok::Punct('{')) => Closer::Brace,
            _ => return Ok(None),
        };
        self.pos += 1;
        if self.eat_punct('|') {
            while !self.eat_punct('|') {
                if self.peek().is_none() {
                    return Err(syntax(line, "unterminated block parameters"));
                }
                self.pos += 1;
            }
        }
        Ok(Some(Frame {
            closer,
            line,
            inert: true,
        }))
    }

    fn namespace(&mut self) -> Result<(), ParseError> {
        self.pos += 1;
        let parens = self.eat_punct('(');
        let name = self.name("a namespace name")?;
        if parens {
            self.expect_punct(')')?;
        }
        let Some(frame) = self.block_opener()? else {
            return Err(self.unexpected("a namespace block"));
        };
        self.namespace.push(name);
        self.statements(Some(frame))?;
        self.namespace.pop();
        Ok(())
    }

    fn description(&mut self) -> Result<(), ParseError> {
        self.pos += 1;
        let parens = self.eat_punct('(');
        let line = self.line();
        let text = match self.peek() {
            Some(Tok::Str {
                value,
                interpolated: false,
            }) => value.clone(),
            Some(Tok::Str { .. }) => return Err(violation(line, "string interpolation")),
            Some(Tok::Command) => return Err(violation(line, "shell command")),
            _ => return Err(self.unexpected("a description string")),
        };
        self.pos += 1;
        if parens {
            self.expect_punct(')')?;
        }
        self.statement_end()?;
        self.comment = Some(text);
        Ok(())
    }

    fn task(&mut self) -> Result<(), ParseError> {
        self.pos += 1;
        let parens = self.eat_punct('(');
        let mut parameters = vec![];
        let mut dependencies = vec![];

        let local = if let Some(Tok::Label(label)) = self.peek() {
            let label = label.clone();
            self.pos += 1;
            dependencies = self.dependencies()?;
            label
        } else {
            let local = self.name("a task name")?;
            if self.eat(&Tok::Arrow) {
                dependencies = self.dependencies()?;
            }
            local
        };

        while self.eat_punct(',') {
            self.skip_newlines();
            let line = self.line();
            let keyed = self.peek_at(1) == Some(&Tok::Arrow);
            match self.peek().cloned() {
                Some(Tok::Label(label)) if label == "needs" => {
                    self.pos += 1;
                    dependencies = self.dependencies()?;
                }
                Some(Tok::Label(label)) => {
                    return Err(syntax(line, format!("unsupported task option `{label}`")));
                }
                Some(
                    Tok::Sym(key)
                    | Tok::Str {
                        value: key,
                        interpolated: false,
                    },
                ) if keyed => {
                    if key != "needs" {
                        return Err(syntax(line, format!("unsupported task option `{key}`")));
                    }
                    self.pos += 2;
                    dependencies = self.dependencies()?;
                }
                Some(Tok::Punct('[')) => {
                    parameters.extend(self.name_list()?);
                    if self.eat(&Tok::Arrow) {
                        dependencies = self.dependencies()?;
                    }
                }
                _ => parameters.push(self.name("a task argument")?),
            }
        }
        if parens {
            self.skip_newlines();
            self.expect_punct(')')?;
        }

        let body = match self.block_opener()? {
            Some(frame) => {
                let body_start = self.tokens[self.pos - 1].end;
                let close = self.walk(self.pos, vec![frame], false)?;
                let body = trim_body(&self.src[body_start..self.tokens[close].start]);
                self.pos = close + 1;
                body
            }
            None => {
                self.statement_end()?;
                String::new()
            }
        };

        let mut name = self.namespace.join(":");
        if !name.is_empty() {
            name.push(':');
        }
        name.push_str(&local);
        self.tasks.push(Task::new(
            name,
            parameters,
            dependencies,
            self.comment.take(),
            body,
        ));
        Ok(())
    }
}

/// Drops the blank remainder of the opener line and the indentation
/// before the closer, keeping everything in between as is.
fn trim_body(raw: &str) -> String {
    let Some(first_break) = raw.find('\n') else {
        return raw.trim().to_owned();
    };
    let mut body = raw;
    if body[..first_break].trim().is_empty() {
        body = &body[first_break + 1..];
    }
    if let Some(last_break) = body.rfind('\n') {
        if body[last_break + 1..].trim().is_empty() {
            body = &body[..last_break];
        }
    }
    if body.trim().is_empty() {
        return String::new();
    }
    body.trim_end_matches('\r').to_owned()
}
