use config::{intergap, intersection};
use hashbrown::HashMap;
use ispack::Boundary;

/// One agglomeration step: clusters `left` and `right` joined at `distance`
///
/// Ids below `n` are observations, id `n + k` is the cluster built at step `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Distance between two element boundaries
///
/// Intersecting boundaries score `1 / shared bases`, so any intersection
/// stays at or below 1.0; disjoint ones score `2 + gap`.
pub fn dissimilarity(a: Boundary, b: Boundary) -> f64 {
    let shared = intersection(a.span(), b.span());
    if shared > 0 {
        1.0 / shared as f64
    } else {
        2.0 + intergap(a.span(), b.span()) as f64
    }
}

#[inline(always)]
fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// Upper triangle of the pairwise distance matrix, row by row
pub fn condensed_matrix(boundaries: &[Boundary]) -> Vec<f64> {
    let n = boundaries.len();
    let mut matrix = Vec::with_capacity(n * n.saturating_sub(1) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            matrix.push(dissimilarity(boundaries[i], boundaries[j]));
        }
    }

    matrix
}

struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        ra
    }
}

/// Single-linkage agglomerative clustering of `n` observations
///
/// Built from the minimum spanning tree of the condensed matrix (Prim),
/// whose edges, taken by increasing distance, are exactly the single
/// linkage merges.
///
/// # Arguments
///
/// * `n` - number of observations
/// * `matrix` - condensed distance matrix from `condensed_matrix`
///
/// # Returns
///
/// * `Vec<Merge>` - `n - 1` merges by increasing distance
///
/// # Example
///
/// ```rust, ignore
/// let merges = single_linkage(3, &condensed_matrix(&boundaries));
/// assert_eq!(merges.len(), 2);
/// ```
pub fn single_linkage(n: usize, matrix: &[f64]) -> Vec<Merge> {
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }

            let d = matrix[condensed_index(n, current, j)];
            if d < best[j] {
                best[j] = d;
                parent[j] = current;
            }
            if next == usize::MAX || best[j] < best[next] {
                next = j;
            }
        }

        in_tree[next] = true;
        edges.push((parent[next], next, best[next]));
        current = next;
    }
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut sets = DisjointSet::new(n);
    let mut cluster_id = (0..n).collect::<Vec<_>>();
    edges
        .into_iter()
        .enumerate()
        .map(|(step, (a, b, distance))| {
            let (ra, rb) = (sets.find(a), sets.find(b));
            let (left, right) = (
                cluster_id[ra].min(cluster_id[rb]),
                cluster_id[ra].max(cluster_id[rb]),
            );

            let root = sets.union(ra, rb);
            cluster_id[root] = n + step;

            Merge {
                left,
                right,
                distance,
                size: sets.size[root],
            }
        })
        .collect()
}

/// Flat clusters whose members are at most `cut` apart in the tree
///
/// Labels start at 1 and follow the first appearance of each cluster.
pub fn fcluster(n: usize, merges: &[Merge], cut: f64) -> Vec<usize> {
    // INFO: any observation of a cluster stands for it when replaying merges
    let mut anchor: Vec<usize> = (0..n).collect();
    let mut sets = DisjointSet::new(n);

    for merge in merges {
        let (a, b) = (anchor[merge.left], anchor[merge.right]);
        if merge.distance <= cut {
            sets.union(a, b);
        }
        anchor.push(a);
    }

    let mut labels = vec![0usize; n];
    let mut seen = HashMap::new();
    for (i, label) in labels.iter_mut().enumerate() {
        let root = sets.find(i);
        let next = seen.len() + 1;
        *label = *seen.entry(root).or_insert(next);
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bd(begin: u64, end: u64) -> Boundary {
        Boundary::new(begin, end)
    }

    #[test]
    fn test_dissimilarity() {
        assert_eq!(dissimilarity(bd(100, 500), bd(500, 900)), 1.0);
        assert_eq!(dissimilarity(bd(100, 500), bd(401, 900)), 0.01);
        assert_eq!(dissimilarity(bd(100, 500), bd(511, 900)), 13.0);
    }

    #[test]
    fn test_condensed_index_matches_layout() {
        let boundaries = vec![bd(1, 10), bd(5, 20), bd(30, 40), bd(35, 50)];
        let matrix = condensed_matrix(&boundaries);

        assert_eq!(matrix.len(), 6);
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_eq!(
                    matrix[condensed_index(4, i, j)],
                    dissimilarity(boundaries[i], boundaries[j])
                );
            }
        }
    }

    #[test]
    fn test_single_linkage_and_cut() {
        let boundaries = vec![bd(100, 500), bd(105, 510), bd(2000, 2500), bd(2500, 3000)];
        let merges = single_linkage(4, &condensed_matrix(&boundaries));

        assert_eq!(merges.len(), 3);
        assert!(merges.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(merges.last().unwrap().size, 4);

        let labels = fcluster(4, &merges, 1.1);
        assert_eq!(labels, vec![1, 1, 2, 2]);

        let labels = fcluster(4, &merges, 0.5);
        assert_eq!(labels, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_chained_clusters_join_through_single_link() {
        // a-b and b-c intersect, a-c do not
        let boundaries = vec![bd(1, 100), bd(90, 200), bd(190, 300)];
        let merges = single_linkage(3, &condensed_matrix(&boundaries));

        assert_eq!(fcluster(3, &merges, 1.1), vec![1, 1, 1]);
        assert!(single_linkage(1, &[]).is_empty());
    }
}
