use crate::token::Span;

/// Root of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub body: Vec<Node>,
}

impl Program {
    #[must_use]
    pub const fn new(body: Vec<Node>) -> Self {
        Self { body }
    }
}

/// A syntax node. `span.file` is the node's origin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// One variant per language construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A braced argument group or parameter value: a nested statement list.
    Program(Vec<Node>),
    /// Literal text, escapes already resolved.
    RawText(String),
    /// `\name[params]{args}...`, resolved at interpretation time.
    FunctionCall {
        name: String,
        params: Option<ParamList>,
        args: Vec<Node>,
    },
    /// `\f[params]{name}{body}`.
    FunctionDefinition {
        name: Box<Node>,
        params: ParamList,
        body: Box<Node>,
    },
    If {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    /// `\match{subject}{\case{..}{..}...}`; every case is a `Case` node.
    Match {
        subject: Box<Node>,
        cases: Vec<Node>,
    },
    Case {
        value: Box<Node>,
        body: Box<Node>,
    },
    Loop {
        init: Box<Node>,
        condition: Box<Node>,
        increment: Box<Node>,
        body: Box<Node>,
    },
    UrlRead(Box<Node>),
    FileRead(Box<Node>),
    /// `\use[overrides]{target}{hash}`.
    Use {
        target: Box<Node>,
        hash: Option<Box<Node>>,
        params: Option<ParamList>,
    },
    Exec(Box<Node>),
    /// Host expression source, delimiters stripped.
    InlineExpr(String),
    Comment(String),
}

/// Ordered `[key=value,...]` list; `None` marks a flag-style entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamList {
    pub entries: Vec<(String, Option<Node>)>,
    pub span: Span,
}

impl ParamList {
    /// Insert or replace `key`, keeping its first position.
    pub fn insert(&mut self, key: String, value: Option<Node>) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Option<Node>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Node {
    #[must_use]
    pub const fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Stamp `file` as origin on this node and every descendant that has
    /// none yet.
    pub fn stamp_origin(&mut self, file: &str) {
        self.span.stamp(file);
        for child in self.children_mut() {
            child.stamp_origin(file);
        }
        if let Some(params) = self.params_mut() {
            params.span.stamp(file);
            for value in params.entries.iter_mut().filter_map(|(_, v)| v.as_mut()) {
                value.stamp_origin(file);
            }
        }
    }

    /// Plain text of a node built only from raw text, if it is one.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match &self.kind {
            NodeKind::RawText(text) => Some(text.clone()),
            NodeKind::Program(body) => body.iter().map(Self::as_text).collect(),
            _ => None,
        }
    }

    pub(crate) fn params_mut(&mut self) -> Option<&mut ParamList> {
        match &mut self.kind {
            NodeKind::FunctionCall { params, .. } | NodeKind::Use { params, .. } => {
                params.as_mut()
            }
            NodeKind::FunctionDefinition { params, .. } => Some(params),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut Self> {
        match &mut self.kind {
            NodeKind::Program(body) => body.iter_mut().collect(),
            NodeKind::FunctionCall { args, .. } => args.iter_mut().collect(),
            NodeKind::FunctionDefinition { name, body, .. } => vec![&mut **name, &mut **body],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![&mut **condition, &mut **then_branch];
                if let Some(branch) = else_branch {
                    children.push(&mut **branch);
                }
                children
            }
            NodeKind::Match { subject, cases } => {
                let mut children = vec![&mut **subject];
                children.extend(cases.iter_mut());
                children
            }
            NodeKind::Case { value, body } => vec![&mut **value, &mut **body],
            NodeKind::Loop {
                init,
                condition,
                increment,
                body,
            } => vec![
                &mut **init,
                &mut **condition,
                &mut **increment,
                &mut **body,
            ],
            NodeKind::UrlRead(inner) | NodeKind::FileRead(inner) | NodeKind::Exec(inner) => {
                vec![&mut **inner]
            }
            NodeKind::Use { target, hash, .. } => {
                let mut children = vec![&mut **target];
                if let Some(hash) = hash {
                    children.push(&mut **hash);
                }
                children
            }
            NodeKind::RawText(_) | NodeKind::InlineExpr(_) | NodeKind::Comment(_) => Vec::new(),
        }
    }
}
