//! Relation dependency analyses.
//!
//! The precedence graph has an edge `R -> S` whenever some clause with
//! head `S` mentions `R` in its body (positively, negated, or inside an
//! aggregator). SCCs of this graph are the units of mutual recursion;
//! the SCC graph orders them so that dependencies come before
//! dependents, which is the stratum order used by the labelling pass.

use datalog_ast::{visit, Program, QualifiedName};
use std::collections::{BTreeMap, BTreeSet};

/// Dependency graph over relation names.
#[derive(Clone, Debug, Default)]
pub struct PrecedenceGraph {
    vertices: Vec<QualifiedName>,
    index: BTreeMap<QualifiedName, usize>,
    successors: Vec<BTreeSet<usize>>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl PrecedenceGraph {
    pub fn compute(program: &Program) -> Self {
        let mut graph = PrecedenceGraph::default();

        for rel in &program.relations {
            graph.add_vertex(rel.name.clone());
        }
        // Atoms of undeclared relations still participate; the checker
        // reports them separately.
        visit::for_each_atom_in_program(program, &mut |atom| {
            graph.add_vertex(atom.name.clone());
        });

        for clause in &program.clauses {
            let head = graph.index[&clause.head.name];
            for lit in &clause.body {
                visit::for_each_atom_in_literal(lit, &mut |atom| {
                    let body = graph.index[&atom.name];
                    graph.successors[body].insert(head);
                    graph.predecessors[head].insert(body);
                });
            }
        }

        graph
    }

    fn add_vertex(&mut self, name: QualifiedName) {
        if !self.index.contains_key(&name) {
            self.index.insert(name.clone(), self.vertices.len());
            self.vertices.push(name);
            self.successors.push(BTreeSet::new());
            self.predecessors.push(BTreeSet::new());
        }
    }

    pub fn vertices(&self) -> &[QualifiedName] {
        &self.vertices
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.index.contains_key(name)
    }

    /// Relations whose clauses use `name`.
    pub fn successors(&self, name: &QualifiedName) -> Vec<&QualifiedName> {
        match self.index.get(name) {
            Some(&v) => self.successors[v].iter().map(|&s| &self.vertices[s]).collect(),
            None => Vec::new(),
        }
    }

    /// Relations used by the clauses of `name`.
    pub fn predecessors(&self, name: &QualifiedName) -> Vec<&QualifiedName> {
        match self.index.get(name) {
            Some(&v) => self.predecessors[v]
                .iter()
                .map(|&p| &self.vertices[p])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether `to` is reachable from `from` along one or more edges.
    pub fn reaches(&self, from: &QualifiedName, to: &QualifiedName) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        let mut visited = vec![false; self.vertices.len()];
        let mut stack: Vec<usize> = self.successors[from].iter().copied().collect();
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            if !visited[v] {
                visited[v] = true;
                stack.extend(self.successors[v].iter().copied());
            }
        }
        false
    }

    /// The SCC of `name`: all vertices on a cycle through it, itself
    /// included when it lies on one.
    pub fn clique(&self, name: &QualifiedName) -> BTreeSet<QualifiedName> {
        let mut clique = BTreeSet::new();
        for other in &self.vertices {
            if self.reaches(name, other) && self.reaches(other, name) {
                clique.insert(other.clone());
            }
        }
        clique
    }

    /// Transitive closure of successors, `name` excluded unless cyclic.
    pub fn reachable_from(&self, name: &QualifiedName) -> BTreeSet<QualifiedName> {
        let mut result = BTreeSet::new();
        let Some(&start) = self.index.get(name) else {
            return result;
        };
        let mut stack: Vec<usize> = self.successors[start].iter().copied().collect();
        while let Some(v) = stack.pop() {
            if result.insert(self.vertices[v].clone()) {
                stack.extend(self.successors[v].iter().copied());
            }
        }
        result
    }
}

/// Condensation of the precedence graph, strata in dependency order.
#[derive(Clone, Debug, Default)]
pub struct SccGraph {
    strata: Vec<Vec<QualifiedName>>,
    scc_of: BTreeMap<QualifiedName, usize>,
}

impl SccGraph {
    pub fn compute(graph: &PrecedenceGraph) -> Self {
        let n = graph.vertices.len();
        let mut state = TarjanState {
            graph,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        };
        for v in 0..n {
            if state.index[v].is_none() {
                state.strongconnect(v);
            }
        }

        // Tarjan emits dependents before their dependencies; reverse to
        // obtain stratum order (dependencies first).
        state.sccs.reverse();
        let mut scc_graph = SccGraph::default();
        for (stratum, members) in state.sccs.into_iter().enumerate() {
            let names: Vec<QualifiedName> = members
                .into_iter()
                .map(|v| graph.vertices[v].clone())
                .collect();
            for name in &names {
                scc_graph.scc_of.insert(name.clone(), stratum);
            }
            scc_graph.strata.push(names);
        }
        scc_graph
    }

    pub fn num_sccs(&self) -> usize {
        self.strata.len()
    }

    pub fn scc_of(&self, name: &QualifiedName) -> Option<usize> {
        self.scc_of.get(name).copied()
    }

    /// Relations internal to the given stratum.
    pub fn relations(&self, stratum: usize) -> &[QualifiedName] {
        &self.strata[stratum]
    }
}

struct TarjanState<'a> {
    graph: &'a PrecedenceGraph,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    sccs: Vec<Vec<usize>>,
}

impl TarjanState<'_> {
    fn strongconnect(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let successors: Vec<usize> = self.graph.successors[v].iter().copied().collect();
        for w in successors {
            match self.index[w] {
                None => {
                    self.strongconnect(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(w_index);
                }
                _ => {}
            }
        }

        if self.lowlink[v] == self.index[v].unwrap() {
            let mut scc = Vec::new();
            loop {
                let w = self.stack.pop().unwrap();
                self.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(scc);
        }
    }
}

/// Which clauses of the program are recursive.
#[derive(Clone, Debug, Default)]
pub struct RecursiveClauses {
    recursive: BTreeSet<usize>,
}

impl RecursiveClauses {
    pub fn compute(program: &Program, sccs: &SccGraph) -> Self {
        let mut result = RecursiveClauses::default();
        for (idx, clause) in program.clauses.iter().enumerate() {
            let head_scc = sccs.scc_of(&clause.head.name);
            let mut recursive = false;
            for lit in &clause.body {
                visit::for_each_atom_in_literal(lit, &mut |atom| {
                    if head_scc.is_some() && sccs.scc_of(&atom.name) == head_scc {
                        recursive = true;
                    }
                });
            }
            if recursive {
                result.recursive.insert(idx);
            }
        }
        result
    }

    /// Whether the clause at `index` in the program's clause list is
    /// recursive.
    pub fn is_recursive(&self, index: usize) -> bool {
        self.recursive.contains(&index)
    }
}
