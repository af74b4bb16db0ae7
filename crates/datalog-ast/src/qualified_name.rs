use std::fmt;

/// A dotted, ordered sequence of name components.
///
/// Qualified names are the namespace currency of the rewrite pipeline:
/// each stage mints fresh names by prepending a reserved component
/// (`@split_in`, `@interm_in`, `@interm_out`, `@magic`, `@neglabel`,
/// `@poscopy_<k>`) or appending an adornment marker (`{bfb}`), so the
/// first component's prefix always identifies the layer that introduced
/// the relation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    components: Vec<String>,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            components: vec![name.into()],
        }
    }

    pub fn from_components(components: Vec<String>) -> Self {
        assert!(!components.is_empty(), "qualified name must be non-empty");
        Self { components }
    }

    /// Parse a user-supplied dotted name, e.g. from a config option.
    pub fn parse(dotted: &str) -> Self {
        let components: Vec<String> = dotted.split('.').map(str::to_string).collect();
        Self::from_components(components)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn first(&self) -> &str {
        &self.components[0]
    }

    pub fn last(&self) -> &str {
        self.components.last().expect("non-empty by construction")
    }

    pub fn prepend(&mut self, component: impl Into<String>) {
        self.components.insert(0, component.into());
    }

    pub fn append(&mut self, component: impl Into<String>) {
        self.components.push(component.into());
    }

    /// Copy of this name with `component` prepended.
    pub fn prepended(&self, component: impl Into<String>) -> Self {
        let mut name = self.clone();
        name.prepend(component);
        name
    }

    /// Copy of this name with `component` appended.
    pub fn appended(&self, component: impl Into<String>) -> Self {
        let mut name = self.clone();
        name.append(component);
        name
    }
}

impl From<&str> for QualifiedName {
    fn from(name: &str) -> Self {
        QualifiedName::new(name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
