//! Parsing of the column list a table declares to the host.
//!
//! Only the column-definition grammar of `CREATE TABLE x(...)` is
//! understood: enough to validate a declaration, learn column names and
//! affinities, and locate the key column.

use vtbridge_error::{Result, VtabError};
use vtbridge_types::TypeAffinity;

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type, normalized to single spaces (`VARCHAR(20)`); may be
    /// empty.
    pub type_name: String,
    pub affinity: TypeAffinity,
    pub primary_key: bool,
    pub not_null: bool,
    /// Declared `HIDDEN`: readable and constrainable but not part of `*`.
    pub hidden: bool,
}

/// A parsed column list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    pub columns: Vec<ColumnDef>,
    /// Columns named by a table-level `PRIMARY KEY (...)` clause.
    pub primary_key: Vec<String>,
}

impl Declaration {
    /// Column position by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The single-column primary key, if the table declares one.
    pub fn key_column(&self) -> Option<usize> {
        if let [only] = self.primary_key.as_slice() {
            return self.column_index(only);
        }
        let mut keyed = self.columns.iter().enumerate().filter(|(_, c)| c.primary_key);
        match (keyed.next(), keyed.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Parse and validate a column list such as
/// `a INTEGER PRIMARY KEY, b REAL, c TEXT`.
pub fn parse_column_list(sql: &str) -> Result<Declaration> {
    let mut declaration = Declaration::default();
    for part in split_top_level(sql)? {
        let definition = part.trim();
        if definition.is_empty() {
            return Err(VtabError::declaration("empty column definition"));
        }
        let tokens = tokenize(definition);
        if is_table_constraint(&tokens) {
            parse_table_constraint(&tokens, &mut declaration)?;
            continue;
        }
        let column = parse_column(definition, &tokens)?;
        if declaration.column_index(&column.name).is_some() {
            return Err(VtabError::declaration(format!(
                "duplicate column name: {}",
                column.name
            )));
        }
        declaration.columns.push(column);
    }
    if declaration.columns.is_empty() {
        return Err(VtabError::declaration("no columns declared"));
    }
    if let Some(missing) = declaration
        .primary_key
        .iter()
        .find(|name| declaration.column_index(name).is_none())
    {
        return Err(VtabError::declaration(format!(
            "PRIMARY KEY names unknown column: {missing}"
        )));
    }
    Ok(declaration)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    /// Parenthesized group, inner text only.
    Group(String),
    Punct,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

const fn closing_quote(open: char) -> Option<char> {
    match open {
        '\'' | '"' | '`' => Some(open),
        '[' => Some(']'),
        _ => None,
    }
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(sql: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in sql.char_indices() {
        if let Some(close) = quote {
            if c == close {
                quote = None;
            }
            continue;
        }
        if let Some(close) = closing_quote(c) {
            quote = Some(close);
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| VtabError::declaration("unbalanced parentheses"))?;
            }
            ',' if depth == 0 => {
                parts.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(VtabError::declaration("unterminated quoted identifier or string"));
    }
    if depth != 0 {
        return Err(VtabError::declaration("unbalanced parentheses"));
    }
    if sql.trim().is_empty() {
        return Err(VtabError::declaration("empty column list"));
    }
    parts.push(&sql[start..]);
    Ok(parts)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenize one (already balanced) definition.
fn tokenize(definition: &str) -> Vec<Token> {
    let chars: Vec<char> = definition.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if let Some(close) = closing_quote(c) {
            let mut text = String::new();
            i += 1;
            while i < chars.len() {
                if chars[i] == close {
                    // A doubled quote is a literal quote character.
                    if close != ']' && chars.get(i + 1) == Some(&close) {
                        text.push(close);
                        i += 2;
                        continue;
                    }
                    break;
                }
                text.push(chars[i]);
                i += 1;
            }
            i += 1;
            tokens.push(Token::Quoted(text));
        } else if c == '(' {
            let mut depth = 0usize;
            let mut quote: Option<char> = None;
            let begin = i + 1;
            while i < chars.len() {
                let ch = chars[i];
                if let Some(close) = quote {
                    if ch == close {
                        quote = None;
                    }
                } else if let Some(close) = closing_quote(ch) {
                    quote = Some(close);
                } else if ch == '(' {
                    depth += 1;
                } else if ch == ')' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                i += 1;
            }
            let end = i.min(chars.len());
            tokens.push(Token::Group(chars[begin..end].iter().collect()));
            i += 1;
        } else if is_word_char(c) {
            let begin = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Word(chars[begin..i].iter().collect()));
        } else {
            tokens.push(Token::Punct);
            i += 1;
        }
    }
    tokens
}

fn is_table_constraint(tokens: &[Token]) -> bool {
    tokens.first().is_some_and(|t| {
        ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]
            .iter()
            .any(|k| t.is_keyword(k))
    })
}

fn parse_table_constraint(tokens: &[Token], declaration: &mut Declaration) -> Result<()> {
    // CONSTRAINT <name> is only a label.
    let body = if tokens[0].is_keyword("CONSTRAINT") {
        tokens.get(2..).unwrap_or_default()
    } else {
        tokens
    };
    if let [primary, key, Token::Group(columns), ..] = body {
        if primary.is_keyword("PRIMARY") && key.is_keyword("KEY") {
            for item in columns.split(',') {
                let item_tokens = tokenize(item);
                match item_tokens.first() {
                    Some(Token::Word(name) | Token::Quoted(name)) => {
                        declaration.primary_key.push(name.clone());
                    }
                    _ => {
                        return Err(VtabError::declaration(format!(
                            "malformed PRIMARY KEY column list: ({columns})"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

const COLUMN_CONSTRAINT_KEYWORDS: [&str; 11] = [
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
];

fn parse_column(definition: &str, tokens: &[Token]) -> Result<ColumnDef> {
    let name = match tokens.first() {
        Some(Token::Word(w)) if !w.starts_with(|c: char| c.is_ascii_digit()) => w.clone(),
        Some(Token::Quoted(q)) if !q.is_empty() => q.clone(),
        _ => {
            return Err(VtabError::declaration(format!(
                "column definition must start with a name: {definition}"
            )));
        }
    };

    let rest = &tokens[1..];
    let mut hidden = false;
    let mut type_name = String::new();
    let mut type_end = rest.len();
    for (i, token) in rest.iter().enumerate() {
        match token {
            Token::Word(w) if w.eq_ignore_ascii_case("HIDDEN") => hidden = true,
            Token::Word(w) if COLUMN_CONSTRAINT_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) => {
                type_end = i;
                break;
            }
            Token::Word(w) => {
                if !type_name.is_empty() {
                    type_name.push(' ');
                }
                type_name.push_str(w);
            }
            Token::Group(g) => {
                type_name.push('(');
                type_name.push_str(g.trim());
                type_name.push(')');
            }
            Token::Quoted(_) | Token::Punct => {
                type_end = i;
                break;
            }
        }
    }

    let constraints = &rest[type_end..];
    let adjacent = |first: &str, second: &str| {
        constraints
            .windows(2)
            .any(|w| w[0].is_keyword(first) && w[1].is_keyword(second))
    };
    let primary_key = adjacent("PRIMARY", "KEY");
    let not_null = adjacent("NOT", "NULL");
    hidden |= constraints.iter().any(|t| t.is_keyword("HIDDEN"));

    Ok(ColumnDef {
        name,
        affinity: TypeAffinity::from_type_name(&type_name),
        type_name,
        primary_key,
        not_null,
        hidden,
    })
}
