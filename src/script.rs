//! Word and list syntax shared by scripts, callbacks and dumps.

use pest::Parser;
use pest::error::{Error, LineColLocation};
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{Result, TableError};

#[derive(Parser)]
#[grammar = "script.pest"]
struct ScriptParser;

/// One command of a script: its words after quote removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub words: Vec<String>,
    pub line: usize,
}

fn parse_error(e: Error<Rule>) -> TableError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((l, c)) => (l, c),
        LineColLocation::Span((l, c), _) => (l, c),
    };
    TableError::Parse {
        message: format!("{} at line {line}, column {col}", e.variant.message()),
        line: Some(line),
        col: Some(col),
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn word_text(word: Pair<Rule>) -> String {
    let Some(inner) = word.into_inner().next() else {
        return String::new();
    };
    match inner.as_rule() {
        Rule::braced => inner
            .into_inner()
            .next()
            .map(|body| body.as_str().to_string())
            .unwrap_or_default(),
        Rule::quoted => inner
            .into_inner()
            .next()
            .map(|body| unescape(body.as_str()))
            .unwrap_or_default(),
        _ => inner.as_str().to_string(),
    }
}

pub fn parse_script(text: &str) -> Result<Vec<Command>> {
    let script = ScriptParser::parse(Rule::script, text)
        .map_err(parse_error)?
        .next()
        .ok_or_else(|| TableError::Parse {
            message: "empty parse".to_string(),
            line: None,
            col: None,
        })?;
    Ok(script
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::command)
        .map(|command| {
            let line = command.as_span().start_pos().line_col().0;
            Command {
                words: command.into_inner().map(word_text).collect(),
                line,
            }
        })
        .collect())
}

pub fn parse_list(text: &str) -> Result<Vec<String>> {
    let list = ScriptParser::parse(Rule::list, text)
        .map_err(parse_error)?
        .next()
        .ok_or_else(|| TableError::Parse {
            message: "empty parse".to_string(),
            line: None,
            col: None,
        })?;
    Ok(list
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::word)
        .map(word_text)
        .collect())
}

fn balanced(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return false,
            '}' => depth -= 1,
            _ => (),
        }
    }
    depth == 0
}

/// Quotes a single list element so that [`parse_list`] gives it back unchanged.
pub fn quote(element: &str) -> String {
    if element.is_empty() {
        return "{}".to_string();
    }
    let plain = !element.starts_with('#')
        && !element
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '"' | '{' | '}' | '\\'));
    if plain {
        return element.to_string();
    }
    if balanced(element) && !element.contains('\\') {
        return format!("{{{element}}}");
    }
    let mut quoted = String::with_capacity(element.len() + 2);
    quoted.push('"');
    for c in element.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

pub fn format_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| quote(item.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
