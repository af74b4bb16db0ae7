//! Type environment and analysis-type lattice.
//!
//! User declarations partition into three kinds: `SYMBOL`, `NUMBER` and
//! `RECORD`. The lattice layers, per kind:
//!
//! ```text
//!            Top
//!             |
//!       Primitive(k)          (the kind itself)
//!             |
//!        Union(k, S)          (closed sets of base names)
//!             |
//!        Base(k, name)        (a declared primitive subtype)
//!             |
//!        Constant(k)          (literals; below every base)
//!             |
//!       BottomPrim(k)         (disjoint bases of one kind)
//!             |
//!          Bottom             (disjoint kinds)
//! ```
//!
//! Record types sit under `Primitive(Record)` and relate through
//! width subtyping: a record is a subtype of any record whose field
//! list is a prefix of its own.

use datalog_ast::{Program, QualifiedName, RecordType, TypeDecl};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Kind {
    Symbol,
    Number,
    Record,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Symbol => write!(f, "symbol"),
            Kind::Number => write!(f, "number"),
            Kind::Record => write!(f, "record"),
        }
    }
}

/// A point in the type lattice.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AnalysisType {
    Top,
    Bottom,
    BottomPrim(Kind),
    Primitive(Kind),
    Constant(Kind),
    Base(Kind, QualifiedName),
    Union(Kind, BTreeSet<QualifiedName>),
    Record(QualifiedName),
}

impl AnalysisType {
    /// Valid types denote at least one value; `Top`, `Bottom` and
    /// `BottomPrim` do not.
    pub fn is_valid(&self) -> bool {
        !matches!(
            self,
            AnalysisType::Top | AnalysisType::Bottom | AnalysisType::BottomPrim(_)
        )
    }

    pub fn kind(&self) -> Option<Kind> {
        match self {
            AnalysisType::Top | AnalysisType::Bottom => None,
            AnalysisType::BottomPrim(k)
            | AnalysisType::Primitive(k)
            | AnalysisType::Constant(k)
            | AnalysisType::Base(k, _)
            | AnalysisType::Union(k, _) => Some(*k),
            AnalysisType::Record(_) => Some(Kind::Record),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Top => write!(f, "any"),
            AnalysisType::Bottom => write!(f, "none"),
            AnalysisType::BottomPrim(k) => write!(f, "none({})", k),
            AnalysisType::Primitive(k) => write!(f, "{}", k),
            AnalysisType::Constant(k) => write!(f, "{} constant", k),
            AnalysisType::Base(_, name) => write!(f, "{}", name),
            AnalysisType::Union(_, names) => {
                let mut first = true;
                for name in names {
                    if !first {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", name)?;
                    first = false;
                }
                Ok(())
            }
            AnalysisType::Record(name) => write!(f, "{}", name),
        }
    }
}

/// Resolved view of the program's type declarations.
#[derive(Clone, Debug, Default)]
pub struct TypeEnvironment {
    bases: BTreeMap<QualifiedName, Kind>,
    unions: BTreeMap<QualifiedName, (Kind, BTreeSet<QualifiedName>)>,
    records: BTreeMap<QualifiedName, RecordType>,
    valid: bool,
}

impl TypeEnvironment {
    /// Resolve all declarations. Unresolvable or mixed-kind
    /// declarations leave the environment invalid; the checker reports
    /// the individual declaration errors itself.
    pub fn build(program: &Program) -> Self {
        let mut env = TypeEnvironment {
            valid: true,
            ..TypeEnvironment::default()
        };

        for decl in &program.types {
            match decl {
                TypeDecl::Primitive(prim) => {
                    let kind = if prim.numeric { Kind::Number } else { Kind::Symbol };
                    env.bases.insert(prim.name.clone(), kind);
                }
                TypeDecl::Record(record) => {
                    env.records.insert(record.name.clone(), record.clone());
                }
                TypeDecl::Union(_) => {}
            }
        }

        // Unions flatten to base-name sets; resolution failures mark
        // the whole environment invalid.
        for decl in &program.types {
            if let TypeDecl::Union(union) = decl {
                let mut bases = BTreeSet::new();
                let mut has_number = false;
                let mut has_symbol = false;
                let mut stack: Vec<QualifiedName> = union.elements.clone();
                let mut seen: BTreeSet<QualifiedName> = BTreeSet::new();
                let mut ok = true;
                while let Some(element) = stack.pop() {
                    if !seen.insert(element.clone()) {
                        continue;
                    }
                    if element == "number".into() {
                        has_number = true;
                        bases.insert(element);
                    } else if element == "symbol".into() {
                        has_symbol = true;
                        bases.insert(element);
                    } else if let Some(kind) = env.bases.get(&element) {
                        match kind {
                            Kind::Number => has_number = true,
                            _ => has_symbol = true,
                        }
                        bases.insert(element);
                    } else if let Some(TypeDecl::Union(inner)) = program.type_decl(&element) {
                        stack.extend(inner.elements.iter().cloned());
                    } else {
                        // undefined or non-primitive element
                        ok = false;
                    }
                }
                if !ok || has_number == has_symbol {
                    env.valid = false;
                    continue;
                }
                let kind = if has_number { Kind::Number } else { Kind::Symbol };
                env.unions.insert(union.name.clone(), (kind, bases));
            }
        }

        // Record fields must name declared types.
        for record in env.records.clone().values() {
            for field in &record.fields {
                if !env.is_type(&field.type_name) {
                    env.valid = false;
                }
            }
        }

        env
    }

    /// Whether `name` is a declared type (the primitives `number` and
    /// `symbol` always are).
    pub fn is_type(&self, name: &QualifiedName) -> bool {
        name == &"number".into()
            || name == &"symbol".into()
            || self.bases.contains_key(name)
            || self.unions.contains_key(name)
            || self.records.contains_key(name)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_record(&self, name: &QualifiedName) -> bool {
        self.records.contains_key(name)
    }

    pub fn record(&self, name: &QualifiedName) -> Option<&RecordType> {
        self.records.get(name)
    }

    /// The lattice point denoted by a declared type name; `Top` for
    /// unknown names.
    pub fn lattice_type(&self, name: &QualifiedName) -> AnalysisType {
        if name == &"number".into() {
            return AnalysisType::Primitive(Kind::Number);
        }
        if name == &"symbol".into() {
            return AnalysisType::Primitive(Kind::Symbol);
        }
        if let Some(kind) = self.bases.get(name) {
            return AnalysisType::Base(*kind, name.clone());
        }
        if let Some((kind, bases)) = self.unions.get(name) {
            // A union reaching a primitive covers the whole kind.
            let primitive_member = match kind {
                Kind::Number => bases.contains(&"number".into()),
                _ => bases.contains(&"symbol".into()),
            };
            if primitive_member {
                return AnalysisType::Primitive(*kind);
            }
            return AnalysisType::Union(*kind, bases.clone());
        }
        if self.records.contains_key(name) {
            return AnalysisType::Record(name.clone());
        }
        AnalysisType::Top
    }

    /// Width subtyping between record types: `sub`'s fields extend
    /// `sup`'s.
    fn is_sub_record(&self, sub: &QualifiedName, sup: &QualifiedName) -> bool {
        if sub == sup {
            return true;
        }
        let (Some(sub_decl), Some(sup_decl)) = (self.records.get(sub), self.records.get(sup))
        else {
            return false;
        };
        sub_decl.fields.len() >= sup_decl.fields.len()
            && sup_decl
                .fields
                .iter()
                .zip(&sub_decl.fields)
                .all(|(a, b)| a.type_name == b.type_name)
    }

    pub fn is_subtype(&self, sub: &AnalysisType, sup: &AnalysisType) -> bool {
        use AnalysisType::*;
        match (sub, sup) {
            (_, Top) | (Bottom, _) => true,
            (Top, _) | (_, Bottom) => false,
            (BottomPrim(k), other) => other.kind() == Some(*k),
            (_, BottomPrim(_)) => false,
            (other, Primitive(k)) => other.kind() == Some(*k),
            (Primitive(_), _) => false,
            (Constant(k), other) => other.kind() == Some(*k),
            (_, Constant(_)) => false,
            (Base(k1, n1), Base(k2, n2)) => k1 == k2 && n1 == n2,
            (Base(k1, n1), Union(k2, set)) => k1 == k2 && set.contains(n1),
            (Union(k1, s1), Union(k2, s2)) => k1 == k2 && s1.is_subset(s2),
            (Union(_, _), Base(_, _)) => false,
            (Record(n1), Record(n2)) => self.is_sub_record(n1, n2),
            (Record(_), _) | (_, Record(_)) => false,
        }
    }

    /// Greatest lower bound used by the per-clause inference. Distinct
    /// base types of one kind meet at `BottomPrim`, distinct kinds at
    /// `Bottom`.
    pub fn meet(&self, a: &AnalysisType, b: &AnalysisType) -> AnalysisType {
        use AnalysisType::*;
        if a == b {
            return a.clone();
        }
        if self.is_subtype(a, b) {
            return a.clone();
        }
        if self.is_subtype(b, a) {
            return b.clone();
        }
        match (a, b) {
            (Top, other) | (other, Top) => other.clone(),
            (Bottom, _) | (_, Bottom) => Bottom,
            _ => {
                let (Some(ka), Some(kb)) = (a.kind(), b.kind()) else {
                    return Bottom;
                };
                if ka != kb {
                    return Bottom;
                }
                match (a, b) {
                    (Union(k, s1), Union(_, s2)) => {
                        let common: BTreeSet<QualifiedName> =
                            s1.intersection(s2).cloned().collect();
                        match common.len() {
                            0 => BottomPrim(*k),
                            1 => Base(*k, common.into_iter().next().unwrap()),
                            _ => Union(*k, common),
                        }
                    }
                    _ => BottomPrim(ka),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{PrimitiveType, RecordField, Span, UnionType};
    use internment::Intern;

    fn base(name: &str, numeric: bool) -> TypeDecl {
        TypeDecl::Primitive(PrimitiveType {
            name: name.into(),
            numeric,
            span: Span::internal(),
        })
    }

    fn union(name: &str, elements: &[&str]) -> TypeDecl {
        TypeDecl::Union(UnionType {
            name: name.into(),
            elements: elements.iter().map(|e| QualifiedName::new(*e)).collect(),
            span: Span::internal(),
        })
    }

    fn sample_env() -> TypeEnvironment {
        let mut program = Program::new();
        program.add_type(base("even", true));
        program.add_type(base("odd", true));
        program.add_type(base("name", false));
        program.add_type(union("int", &["even", "odd"]));
        TypeEnvironment::build(&program)
    }

    #[test]
    fn test_base_under_union() {
        let env = sample_env();
        assert!(env.is_valid());
        let even = env.lattice_type(&"even".into());
        let int = env.lattice_type(&"int".into());
        assert!(env.is_subtype(&even, &int));
        assert!(!env.is_subtype(&int, &even));
        assert!(env.is_subtype(&int, &AnalysisType::Primitive(Kind::Number)));
    }

    #[test]
    fn test_constants_below_bases() {
        let env = sample_env();
        let constant = AnalysisType::Constant(Kind::Number);
        assert!(env.is_subtype(&constant, &env.lattice_type(&"even".into())));
        assert!(!env.is_subtype(&constant, &env.lattice_type(&"name".into())));
    }

    #[test]
    fn test_meet_of_disjoint_bases() {
        let env = sample_env();
        let even = env.lattice_type(&"even".into());
        let odd = env.lattice_type(&"odd".into());
        assert_eq!(env.meet(&even, &odd), AnalysisType::BottomPrim(Kind::Number));

        let name = env.lattice_type(&"name".into());
        assert_eq!(env.meet(&even, &name), AnalysisType::Bottom);
    }

    #[test]
    fn test_mixed_union_invalidates_environment() {
        let mut program = Program::new();
        program.add_type(base("num", true));
        program.add_type(base("str", false));
        program.add_type(union("broken", &["num", "str"]));
        let env = TypeEnvironment::build(&program);
        assert!(!env.is_valid());
    }

    #[test]
    fn test_record_width_subtyping() {
        let mut program = Program::new();
        program.add_type(TypeDecl::Record(RecordType {
            name: "point".into(),
            fields: vec![
                RecordField {
                    name: Intern::new("x".to_string()),
                    type_name: "number".into(),
                },
                RecordField {
                    name: Intern::new("y".to_string()),
                    type_name: "number".into(),
                },
            ],
            span: Span::internal(),
        }));
        program.add_type(TypeDecl::Record(RecordType {
            name: "point3".into(),
            fields: vec![
                RecordField {
                    name: Intern::new("x".to_string()),
                    type_name: "number".into(),
                },
                RecordField {
                    name: Intern::new("y".to_string()),
                    type_name: "number".into(),
                },
                RecordField {
                    name: Intern::new("z".to_string()),
                    type_name: "number".into(),
                },
            ],
            span: Span::internal(),
        }));
        let env = TypeEnvironment::build(&program);
        let p2 = env.lattice_type(&"point".into());
        let p3 = env.lattice_type(&"point3".into());
        assert!(env.is_subtype(&p3, &p2));
        assert!(!env.is_subtype(&p2, &p3));
        assert!(env.is_subtype(&p2, &AnalysisType::Primitive(Kind::Record)));
    }
}
