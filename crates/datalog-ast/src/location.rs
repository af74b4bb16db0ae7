//! Source locations.
//!
//! Every AST node carries a [`Span`]. Nodes built by the parser point
//! into a source file; nodes minted by a rewrite stage (magic atoms,
//! copy rules, `@abdul<k>` variables, …) carry [`Span::internal`]
//! instead, and the error report renders diagnostics against them
//! without a source snippet — there is no user code to point at.

use internment::Intern;
use std::fmt;
use std::ops::Range;
use std::path::Path;

/// Provenance of a node's text.
#[derive(PartialEq, Eq, Hash)]
enum Source {
    /// No provenance; programs assembled directly, e.g. in tests.
    Unknown,
    /// A parsed source file.
    File(String),
    /// Minted by a transformation pass.
    Generated,
}

/// Interned identity of a node's source.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SrcId(Intern<Source>);

impl SrcId {
    pub fn empty() -> Self {
        SrcId(Intern::new(Source::Unknown))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        SrcId(Intern::new(Source::File(
            path.as_ref().display().to_string(),
        )))
    }

    /// Source id shared by all pass-minted nodes.
    pub fn generated() -> Self {
        SrcId(Intern::new(Source::Generated))
    }

    pub fn is_generated(&self) -> bool {
        matches!(&*self.0, Source::Generated)
    }
}

impl fmt::Display for SrcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Source::Unknown => write!(f, "?"),
            Source::File(path) => write!(f, "{}", path),
            Source::Generated => write!(f, "<generated>"),
        }
    }
}

impl fmt::Debug for SrcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Byte range of a node within its source.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    src: SrcId,
    start: u32,
    end: u32,
}

impl Span {
    pub fn new(src: SrcId, range: Range<usize>) -> Self {
        assert!(range.start <= range.end);
        Span {
            src,
            start: range.start as u32,
            end: range.end as u32,
        }
    }

    /// Span of a node that has no surface syntax.
    pub fn internal() -> Self {
        Span {
            src: SrcId::generated(),
            start: 0,
            end: 0,
        }
    }

    pub fn src(&self) -> SrcId {
        self.src
    }

    pub fn start(&self) -> usize {
        self.start as usize
    }

    pub fn end(&self) -> usize {
        self.end as usize
    }

    /// Whether a diagnostic against this span can show user code.
    pub fn points_at_source(&self) -> bool {
        !self.src.is_generated()
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}..{}", self.src, self.start, self.end)
    }
}

impl ariadne::Span for Span {
    type SourceId = SrcId;

    fn source(&self) -> &Self::SourceId {
        &self.src
    }

    fn start(&self) -> usize {
        self.start as usize
    }

    fn end(&self) -> usize {
        self.end as usize
    }
}
