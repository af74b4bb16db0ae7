//! Core AST node definitions.
//!
//! The shape mirrors what the surface parser produces:
//!
//! - **Relation**: declared schema (`.decl edge(a: number, b: number)`)
//! - **Clause**: `head :- body.`; a clause with an empty body is a fact
//! - **Literal**: positive atom, negated atom, binary constraint, or a
//!   boolean constant
//! - **Argument**: the expression sub-language inside atoms, including
//!   functors, records, type casts and aggregators
//!
//! Every [`Argument`] carries an [`ArgId`] stamped at construction.
//! Analyses key their results off these ids, so cloning an argument
//! yields a structurally equal node with a *fresh* identity. Equality
//! between arguments is structural (ids and spans are ignored).

use crate::{QualifiedName, Span};
use internment::Intern;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Interned string for efficient storage and comparison
pub type Symbol = Intern<String>;

/// Stable identity of an argument node, unique within the process.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ArgId(u64);

static NEXT_ARG_ID: AtomicU64 = AtomicU64::new(0);

impl ArgId {
    fn fresh() -> Self {
        ArgId(NEXT_ARG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An argument node: identity + location + structure.
#[derive(Debug)]
pub struct Argument {
    pub id: ArgId,
    pub span: Span,
    pub kind: ArgKind,
}

/// The structural variants of an argument.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ArgKind {
    /// Named variable
    Variable(Symbol),
    /// Anonymous variable `_`
    Unnamed,
    /// Number literal
    Number(i64),
    /// String literal
    Text(Symbol),
    /// Auto-increment counter `$`
    Counter,
    /// `as(value, type)`
    TypeCast(Box<Argument>, QualifiedName),
    /// Built-in functor application
    IntrinsicFunctor(FunctorOp, Vec<Argument>),
    /// Application of a user-declared functor
    UserFunctor(Symbol, Vec<Argument>),
    /// Record constructor `[a, b, c]` typed by its context
    RecordInit(QualifiedName, Vec<Argument>),
    /// Aggregate expression, e.g. `max y : body(y)`
    Aggregator(Box<Aggregator>),
}

impl Argument {
    pub fn new(kind: ArgKind, span: Span) -> Self {
        Argument {
            id: ArgId::fresh(),
            span,
            kind,
        }
    }

    pub fn var(name: &str) -> Self {
        Self::new(
            ArgKind::Variable(Intern::new(name.to_string())),
            Span::internal(),
        )
    }

    pub fn unnamed() -> Self {
        Self::new(ArgKind::Unnamed, Span::internal())
    }

    pub fn number(value: i64) -> Self {
        Self::new(ArgKind::Number(value), Span::internal())
    }

    pub fn text(value: &str) -> Self {
        Self::new(ArgKind::Text(Intern::new(value.to_string())), Span::internal())
    }

    pub fn counter() -> Self {
        Self::new(ArgKind::Counter, Span::internal())
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The variable name, if this node is a named variable.
    pub fn variable_name(&self) -> Option<Symbol> {
        match &self.kind {
            ArgKind::Variable(name) => Some(*name),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ArgKind::Number(_) | ArgKind::Text(_))
    }
}

// Clones give the copy a fresh identity; analyses must never see two
// live nodes sharing an id.
impl Clone for Argument {
    fn clone(&self) -> Self {
        Argument {
            id: ArgId::fresh(),
            span: self.span,
            kind: self.kind.clone(),
        }
    }
}

// Structural equality: identity and location do not participate.
impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Argument {}

/// Aggregate expression over a nested body.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Aggregator {
    pub op: AggregateOp,
    /// Target expression; `None` only for `count`.
    pub target: Option<Argument>,
    pub body: Vec<Literal>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AggregateOp {
    Min,
    Max,
    Count,
    Sum,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
        }
    }
}

/// Built-in functors with their kind signatures.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FunctorOp {
    // unary
    Neg,
    Bnot,
    Lnot,
    Ord,
    Strlen,
    ToNumber,
    ToString,
    // binary
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Mod,
    Umod,
    Fdiv,
    Band,
    Bor,
    Bxor,
    Land,
    Lor,
    Max,
    Min,
    Cat,
    // ternary
    Substr,
}

impl FunctorOp {
    pub fn arity(&self) -> usize {
        use FunctorOp::*;
        match self {
            Neg | Bnot | Lnot | Ord | Strlen | ToNumber | ToString => 1,
            Substr => 3,
            _ => 2,
        }
    }

    /// Whether the functor produces a number.
    pub fn is_numerical(&self) -> bool {
        !matches!(self, FunctorOp::ToString | FunctorOp::Cat | FunctorOp::Substr)
    }

    /// Whether the functor produces a symbol.
    pub fn is_symbolic(&self) -> bool {
        !self.is_numerical()
    }

    pub fn accepts_symbols(&self, index: usize) -> bool {
        use FunctorOp::*;
        match self {
            Ord | Strlen | ToNumber | Cat => true,
            Substr => index == 0,
            _ => false,
        }
    }

    pub fn accepts_numbers(&self, index: usize) -> bool {
        !self.accepts_symbols(index)
    }

    /// Functors whose result depends on evaluation order; clauses using
    /// them are excluded from adornment.
    pub fn is_order_dependent(&self) -> bool {
        matches!(
            self,
            FunctorOp::Mod | FunctorOp::Div | FunctorOp::Fdiv | FunctorOp::Umod
        )
    }

    pub fn name(&self) -> &'static str {
        use FunctorOp::*;
        match self {
            Neg => "-",
            Bnot => "bnot",
            Lnot => "lnot",
            Ord => "ord",
            Strlen => "strlen",
            ToNumber => "to_number",
            ToString => "to_string",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Exp => "^",
            Mod => "%",
            Umod => "umod",
            Fdiv => "fdiv",
            Band => "band",
            Bor => "bor",
            Bxor => "bxor",
            Land => "land",
            Lor => "lor",
            Max => "max",
            Min => "min",
            Cat => "cat",
            Substr => "substr",
        }
    }
}

/// Binary constraint operators.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinaryConstraintOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    Contains,
    NotContains,
    Feq,
    Fne,
    Flt,
    Fle,
    Fgt,
    Fge,
}

impl BinaryConstraintOp {
    /// Ordering comparisons over numbers.
    pub fn is_numerical(&self) -> bool {
        use BinaryConstraintOp::*;
        matches!(self, Lt | Le | Gt | Ge)
    }

    /// String predicates over symbols.
    pub fn is_symbolic(&self) -> bool {
        use BinaryConstraintOp::*;
        matches!(self, Match | NotMatch | Contains | NotContains)
    }

    /// Float comparisons; order-unstable under demand transformation.
    pub fn is_float(&self) -> bool {
        use BinaryConstraintOp::*;
        matches!(self, Feq | Fne | Flt | Fle | Fgt | Fge)
    }

    pub fn name(&self) -> &'static str {
        use BinaryConstraintOp::*;
        match self {
            Eq => "=",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Match => "match",
            NotMatch => "not_match",
            Contains => "contains",
            NotContains => "not_contains",
            Feq => "f=",
            Fne => "f!=",
            Flt => "f<",
            Fle => "f<=",
            Fgt => "f>",
            Fge => "f>=",
        }
    }
}

/// A binary constraint literal such as `x = y + 1` or `a < b`.
#[derive(Clone, Debug)]
pub struct BinaryConstraint {
    pub op: BinaryConstraintOp,
    pub lhs: Argument,
    pub rhs: Argument,
    pub span: Span,
}

impl BinaryConstraint {
    pub fn new(op: BinaryConstraintOp, lhs: Argument, rhs: Argument) -> Self {
        let span = lhs.span;
        BinaryConstraint { op, lhs, rhs, span }
    }
}

impl PartialEq for BinaryConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.lhs == other.lhs && self.rhs == other.rhs
    }
}

impl Eq for BinaryConstraint {}

/// A constant truth value in a rule body.
#[derive(Clone, Debug)]
pub struct BooleanConstraint {
    pub value: bool,
    pub span: Span,
}

impl PartialEq for BooleanConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for BooleanConstraint {}

/// A relation applied to arguments.
#[derive(Clone, Debug)]
pub struct Atom {
    pub name: QualifiedName,
    pub args: Vec<Argument>,
    pub span: Span,
}

impl Atom {
    pub fn new(name: impl Into<QualifiedName>, args: Vec<Argument>) -> Self {
        Atom {
            name: name.into(),
            args,
            span: Span::internal(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args
    }
}

impl Eq for Atom {}

/// A body literal.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Literal {
    Atom(Atom),
    Negation(Atom),
    Constraint(BinaryConstraint),
    Boolean(BooleanConstraint),
}

impl Literal {
    /// The literal's atom, if it is a (possibly negated) atom.
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Literal::Atom(atom) | Literal::Negation(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn is_positive_atom(&self) -> bool {
        matches!(self, Literal::Atom(_))
    }
}

/// One order entry of an execution plan, 1-based over body atoms.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExecutionOrder {
    pub order: Vec<usize>,
    pub span: Span,
}

impl ExecutionOrder {
    /// Complete orders are permutations of `1..=num_atoms`.
    pub fn is_complete(&self, num_atoms: usize) -> bool {
        if self.order.len() != num_atoms {
            return false;
        }
        let mut sorted = self.order.clone();
        sorted.sort_unstable();
        sorted.iter().copied().eq(1..=num_atoms)
    }
}

/// A user-supplied schedule, keyed by recursion version.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ExecutionPlan {
    pub orders: BTreeMap<usize, ExecutionOrder>,
}

impl ExecutionPlan {
    pub fn max_version(&self) -> Option<usize> {
        self.orders.keys().next_back().copied()
    }
}

/// A rule `head :- body.`, or a fact when the body is empty.
#[derive(Clone, Debug)]
pub struct Clause {
    pub head: Atom,
    pub body: Vec<Literal>,
    pub plan: Option<ExecutionPlan>,
    /// Clauses minted by a pass skip style warnings.
    pub generated: bool,
    pub span: Span,
}

impl Clause {
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Clause {
            head,
            body,
            plan: None,
            generated: false,
            span: Span::internal(),
        }
    }

    pub fn fact(head: Atom) -> Self {
        Self::new(head, Vec::new())
    }

    pub fn generated(head: Atom, body: Vec<Literal>) -> Self {
        let mut clause = Self::new(head, body);
        clause.generated = true;
        clause
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Positive body atoms, in source order.
    pub fn body_atoms(&self) -> impl Iterator<Item = &Atom> {
        self.body.iter().filter_map(|lit| match lit {
            Literal::Atom(atom) => Some(atom),
            _ => None,
        })
    }
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.body == other.body && self.plan == other.plan
    }
}

impl Eq for Clause {}

/// A typed attribute of a relation declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Attribute {
    pub name: Symbol,
    pub type_name: QualifiedName,
    pub span: Span,
}

impl Attribute {
    pub fn new(name: &str, type_name: impl Into<QualifiedName>) -> Self {
        Attribute {
            name: Intern::new(name.to_string()),
            type_name: type_name.into(),
            span: Span::internal(),
        }
    }
}

/// Physical representation chosen for a relation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum RelationRepresentation {
    #[default]
    Default,
    /// Equivalence relation; binary, both columns one type.
    Eqrel,
}

/// Declaration-site qualifier bits.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RelationQualifiers {
    pub input: bool,
    pub output: bool,
    pub print_size: bool,
    pub inline: bool,
    pub suppressed: bool,
}

/// A declared relation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Relation {
    pub name: QualifiedName,
    pub attributes: Vec<Attribute>,
    pub representation: RelationRepresentation,
    pub qualifiers: RelationQualifiers,
    pub span: Span,
}

impl Relation {
    pub fn new(name: impl Into<QualifiedName>, attributes: Vec<Attribute>) -> Self {
        Relation {
            name: name.into(),
            attributes,
            representation: RelationRepresentation::Default,
            qualifiers: RelationQualifiers::default(),
            span: Span::internal(),
        }
    }

    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_inline(&self) -> bool {
        self.qualifiers.inline
    }

    pub fn is_suppressed(&self) -> bool {
        self.qualifiers.suppressed
    }

    /// Copy of this relation under a new name, same schema.
    pub fn cloned_as(&self, name: QualifiedName) -> Relation {
        let mut copy = self.clone();
        copy.name = name;
        copy
    }
}

/// Primitive type declaration, e.g. `.number_type age`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PrimitiveType {
    pub name: QualifiedName,
    pub numeric: bool,
    pub span: Span,
}

/// Union type declaration, e.g. `.type id = a | b`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnionType {
    pub name: QualifiedName,
    pub elements: Vec<QualifiedName>,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RecordField {
    pub name: Symbol,
    pub type_name: QualifiedName,
}

/// Record type declaration, e.g. `.type pair = [a: number, b: number]`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RecordType {
    pub name: QualifiedName,
    pub fields: Vec<RecordField>,
    pub span: Span,
}

/// A user type declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TypeDecl {
    Primitive(PrimitiveType),
    Union(UnionType),
    Record(RecordType),
}

impl TypeDecl {
    pub fn name(&self) -> &QualifiedName {
        match self {
            TypeDecl::Primitive(t) => &t.name,
            TypeDecl::Union(t) => &t.name,
            TypeDecl::Record(t) => &t.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypeDecl::Primitive(t) => t.span,
            TypeDecl::Union(t) => t.span,
            TypeDecl::Record(t) => t.span,
        }
    }
}

/// Kind accepted or produced by a user-defined functor slot.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FunctorArgKind {
    Symbol,
    Number,
}

/// Declaration of an external functor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FunctorDeclaration {
    pub name: Symbol,
    pub args: Vec<FunctorArgKind>,
    pub result: FunctorArgKind,
    pub span: Span,
}

impl FunctorDeclaration {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Kind of an I/O directive.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DirectiveKind {
    Input,
    Output,
    PrintSize,
}

/// An I/O directive such as `.input edge(IO=file, filename="e.facts")`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub name: QualifiedName,
    pub params: BTreeMap<String, String>,
    pub span: Span,
}

impl Directive {
    pub fn new(kind: DirectiveKind, name: impl Into<QualifiedName>) -> Self {
        Directive {
            kind,
            name: name.into(),
            params: BTreeMap::new(),
            span: Span::internal(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_string(), value.into());
    }
}

/// The mutable program container handed between passes.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Program {
    pub relations: Vec<Relation>,
    pub clauses: Vec<Clause>,
    pub types: Vec<TypeDecl>,
    pub directives: Vec<Directive>,
    pub functors: Vec<FunctorDeclaration>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(&self, name: &QualifiedName) -> Option<&Relation> {
        self.relations.iter().find(|rel| &rel.name == name)
    }

    pub fn relation_mut(&mut self, name: &QualifiedName) -> Option<&mut Relation> {
        self.relations.iter_mut().find(|rel| &rel.name == name)
    }

    pub fn has_relation(&self, name: &QualifiedName) -> bool {
        self.relation(name).is_some()
    }

    /// Clauses whose head is the given relation, in declaration order.
    pub fn clauses_of<'a>(&'a self, name: &'a QualifiedName) -> impl Iterator<Item = &'a Clause> {
        self.clauses.iter().filter(move |clause| &clause.head.name == name)
    }

    pub fn type_decl(&self, name: &QualifiedName) -> Option<&TypeDecl> {
        self.types.iter().find(|decl| decl.name() == name)
    }

    pub fn functor(&self, name: Symbol) -> Option<&FunctorDeclaration> {
        self.functors.iter().find(|decl| decl.name == name)
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    pub fn add_clause(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn add_type(&mut self, decl: TypeDecl) {
        self.types.push(decl);
    }

    pub fn add_directive(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn add_functor(&mut self, decl: FunctorDeclaration) {
        self.functors.push(decl);
    }
}

// ---------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ArgKind::Variable(name) => write!(f, "{}", name),
            ArgKind::Unnamed => write!(f, "_"),
            ArgKind::Number(value) => write!(f, "{}", value),
            ArgKind::Text(value) => write!(f, "{:?}", value.as_ref()),
            ArgKind::Counter => write!(f, "$"),
            ArgKind::TypeCast(value, ty) => write!(f, "as({}, {})", value, ty),
            ArgKind::IntrinsicFunctor(op, args) => {
                if op.arity() == 2 && !op.name().chars().next().unwrap().is_alphabetic() {
                    write!(f, "({} {} {})", args[0], op.name(), args[1])
                } else {
                    write!(f, "{}(", op.name())?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")
                }
            }
            ArgKind::UserFunctor(name, args) => {
                write!(f, "@{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ArgKind::RecordInit(_, fields) => {
                write!(f, "[")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "]")
            }
            ArgKind::Aggregator(aggr) => {
                write!(f, "{}", aggr.op.name())?;
                if let Some(target) = &aggr.target {
                    write!(f, " {}", target)?;
                }
                write!(f, " : {{ ")?;
                for (i, lit) in aggr.body.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", lit)?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Atom(atom) => write!(f, "{}", atom),
            Literal::Negation(atom) => write!(f, "!{}", atom),
            Literal::Constraint(c) => write!(f, "{} {} {}", c.lhs, c.op.name(), c.rhs),
            Literal::Boolean(b) => write!(f, "{}", if b.value { "true" } else { "false" }),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, lit) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", lit)?;
            }
        }
        write!(f, ".")
    }
}
