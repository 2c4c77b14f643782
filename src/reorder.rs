//! Similarity-driven reordering of token sequences.
//!
//! Every method is a pure rearrangement: the output holds exactly the input tokens. The minimum
//! spanning tree methods treat tokens as vertices of a complete graph weighted by
//! `1 - similarity`, then emit the depth-first pre-order of the tree rooted at the first token.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, SaniproError};
use crate::similarity::{SequenceMatcherSimilarity, SimilarityStrategy};
use crate::token::Token;

/// Above this many tokens the naive search emits a warning.
pub const NAIVE_WARN_THRESHOLD: usize = 8;

const SCORE_EPSILON: f64 = 1e-9;

/// Reordering algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReorderMethod {
    /// Exhaustive search over every permutation.
    Naive,
    /// Nearest-neighbour chain.
    Greedy,
    /// Minimum spanning tree built with Kruskal's algorithm.
    Kruskal,
    /// Minimum spanning tree built with Prim's algorithm.
    Prim,
}

impl ReorderMethod {
    /// Names accepted by [`ReorderMethod::from_str`].
    #[must_use]
    pub fn choices() -> &'static [&'static str] {
        &["naive", "greedy", "kruskal", "prim", "mst"]
    }
}

impl fmt::Display for ReorderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Naive => "naive",
            Self::Greedy => "greedy",
            Self::Kruskal => "kruskal",
            Self::Prim => "prim",
        };
        f.write_str(name)
    }
}

impl FromStr for ReorderMethod {
    type Err = SaniproError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "greedy" => Ok(Self::Greedy),
            "kruskal" | "mst" => Ok(Self::Kruskal),
            "prim" => Ok(Self::Prim),
            other => Err(SaniproError::InvalidConfig(format!(
                "unknown reorder method {other:?}; expected one of {}",
                Self::choices().join(", ")
            ))),
        }
    }
}

/// How the greedy chain picks its first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreedyStart {
    /// Shuffle the tokens and start from the last one; a seed makes the shuffle repeatable.
    Random {
        /// Optional RNG seed.
        seed: Option<u64>,
    },
    /// Start from the last token without shuffling.
    Last,
}

impl Default for GreedyStart {
    fn default() -> Self {
        Self::Random { seed: None }
    }
}

/// Reorders tokens so that similar names end up next to each other.
#[derive(Debug, Clone)]
pub struct Reorderer {
    method: ReorderMethod,
    strategy: Arc<dyn SimilarityStrategy>,
    greedy_start: GreedyStart,
}

impl Reorderer {
    /// Creates a reorderer using `method` and `strategy`.
    #[must_use]
    pub fn new(method: ReorderMethod, strategy: Arc<dyn SimilarityStrategy>) -> Self {
        Self {
            method,
            strategy,
            greedy_start: GreedyStart::default(),
        }
    }

    /// Creates a reorderer backed by [`SequenceMatcherSimilarity`].
    #[must_use]
    pub fn with_default_strategy(method: ReorderMethod) -> Self {
        Self::new(method, Arc::new(SequenceMatcherSimilarity))
    }

    /// Overrides how the greedy method chooses its starting token.
    #[must_use]
    pub fn greedy_start(mut self, start: GreedyStart) -> Self {
        self.greedy_start = start;
        self
    }

    /// Returns the configured algorithm.
    #[must_use]
    pub fn method(&self) -> ReorderMethod {
        self.method
    }

    /// Returns a rearrangement of `tokens` that keeps similar names adjacent.
    #[must_use]
    pub fn find_optimal_order(&self, tokens: &[Token]) -> Vec<Token> {
        if tokens.len() < 2 {
            return tokens.to_vec();
        }
        debug!(
            "reordering {} tokens with the {} method using {:?}",
            tokens.len(),
            self.method,
            self.strategy
        );
        let order = match self.method {
            ReorderMethod::Naive => self.naive_order(tokens),
            ReorderMethod::Greedy => return self.greedy_order(tokens),
            ReorderMethod::Kruskal => {
                let matrix = self.similarity_matrix(tokens);
                preorder(&kruskal_tree(&matrix))
            }
            ReorderMethod::Prim => {
                let matrix = self.similarity_matrix(tokens);
                preorder(&prim_tree(&matrix))
            }
        };
        order.into_iter().map(|idx| tokens[idx].clone()).collect()
    }

    fn similarity_matrix(&self, tokens: &[Token]) -> Vec<Vec<f64>> {
        let n = tokens.len();
        let mut matrix = vec![vec![1.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let score = self
                    .strategy
                    .calculate_similarity(tokens[i].name(), tokens[j].name());
                matrix[i][j] = score;
                matrix[j][i] = score;
            }
        }
        matrix
    }

    fn naive_order(&self, tokens: &[Token]) -> Vec<usize> {
        if tokens.len() > NAIVE_WARN_THRESHOLD {
            warn!(
                "naive reordering of {} tokens evaluates every permutation and may take very long",
                tokens.len()
            );
        }
        let matrix = self.similarity_matrix(tokens);
        let score = |order: &[usize]| -> f64 {
            order
                .windows(2)
                .map(|pair| matrix[pair[0]][pair[1]])
                .sum()
        };

        let mut current: Vec<usize> = (0..tokens.len()).collect();
        let mut best = current.clone();
        let mut best_score = score(&current);
        while next_permutation(&mut current) {
            let total = score(&current);
            if total > best_score + SCORE_EPSILON {
                best_score = total;
                best.clone_from(&current);
            }
        }
        best
    }

    fn greedy_order(&self, tokens: &[Token]) -> Vec<Token> {
        let mut remaining = tokens.to_vec();
        if let GreedyStart::Random { seed } = self.greedy_start {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            remaining.shuffle(&mut rng);
        }
        let Some(start) = remaining.pop() else {
            return Vec::new();
        };

        let mut chain = Vec::with_capacity(tokens.len());
        chain.push(start);
        while !remaining.is_empty() {
            let last = chain[chain.len() - 1].name();
            let mut best: Option<(usize, f64)> = None;
            for (idx, candidate) in remaining.iter().enumerate() {
                let score = self.strategy.calculate_similarity(last, candidate.name());
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((idx, score));
                }
            }
            let idx = best.map_or(0, |(idx, _)| idx);
            chain.push(remaining.remove(idx));
        }
        chain
    }
}

/// Advances `order` to the next lexicographic permutation, returning `false` after the last one.
fn next_permutation(order: &mut [usize]) -> bool {
    let Some(pivot) = order.windows(2).rposition(|pair| pair[0] < pair[1]) else {
        return false;
    };
    let Some(successor) = order.iter().rposition(|&value| value > order[pivot]) else {
        return false;
    };
    order.swap(pivot, successor);
    order[pivot + 1..].reverse();
    true
}

#[derive(Copy, Clone, Debug)]
struct Edge {
    weight: f64,
    u: usize,
    v: usize,
}

impl Edge {
    fn new(matrix: &[Vec<f64>], u: usize, v: usize) -> Self {
        Self {
            weight: 1.0 - matrix[u][v],
            u,
            v,
        }
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.u.cmp(&other.u))
            .then_with(|| self.v.cmp(&other.v))
    }
}

impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Edge {}

/// Tree adjacency lists, neighbours kept in the order their edges were accepted.
type Tree = Vec<Vec<usize>>;

fn link(tree: &mut Tree, edge: Edge) {
    tree[edge.u].push(edge.v);
    tree[edge.v].push(edge.u);
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    /// Merges the sets holding `a` and `b`; returns `false` when they were already joined.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a == root_b {
            return false;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            Ordering::Less => self.parent[root_a] = root_b,
            Ordering::Greater => self.parent[root_b] = root_a,
            Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
        true
    }
}

fn kruskal_tree(matrix: &[Vec<f64>]) -> Tree {
    let n = matrix.len();
    let mut edges = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for u in 0..n {
        for v in (u + 1)..n {
            edges.push(Edge::new(matrix, u, v));
        }
    }
    edges.sort();

    let mut tree = vec![Vec::new(); n];
    let mut sets = DisjointSet::new(n);
    let mut accepted = 0usize;
    for edge in edges {
        if accepted + 1 >= n {
            break;
        }
        if sets.union(edge.u, edge.v) {
            link(&mut tree, edge);
            accepted += 1;
        }
    }
    tree
}

fn prim_tree(matrix: &[Vec<f64>]) -> Tree {
    let n = matrix.len();
    let mut tree = vec![Vec::new(); n];
    if n == 0 {
        return tree;
    }
    let mut visited = vec![false; n];
    let mut frontier = BinaryHeap::new();
    let mut vertex = 0usize;
    loop {
        visited[vertex] = true;
        for next in (0..n).filter(|&next| !visited[next]) {
            frontier.push(Reverse(Edge::new(matrix, vertex, next)));
        }
        let edge = loop {
            match frontier.pop() {
                Some(Reverse(edge)) if visited[edge.v] => continue,
                Some(Reverse(edge)) => break Some(edge),
                None => break None,
            }
        };
        let Some(edge) = edge else {
            return tree;
        };
        link(&mut tree, edge);
        vertex = edge.v;
    }
}

/// Depth-first pre-order walk from vertex 0.
fn preorder(tree: &Tree) -> Vec<usize> {
    let mut order = Vec::with_capacity(tree.len());
    if tree.is_empty() {
        return order;
    }
    let mut visited = vec![false; tree.len()];
    let mut stack = vec![0usize];
    while let Some(vertex) = stack.pop() {
        if visited[vertex] {
            continue;
        }
        visited[vertex] = true;
        order.push(vertex);
        for &next in tree[vertex].iter().rev() {
            if !visited[next] {
                stack.push(next);
            }
        }
    }
    order
}
