//! KD-tree point index for nearest-neighbour queries.
//!
//! Scan data is full of points sharing one coordinate: a levelled road
//! sits on a single height, and grid-sampled patches line up along both
//! horizontal axes. kiddo's buckets cannot split a run of equal values on
//! the split axis, so points are inserted in a fixed, generically rotated
//! frame. Distances do not change under rotation, so queries are exact.
//!
//! Rotation cannot separate points at the same position. Coincident points
//! share one tree entry and are expanded again on query. Points with a
//! non-finite coordinate are never indexed.

use hashbrown::hash_map::{Entry, HashMap};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Rotation3, Vector3};

/// A neighbour returned by a [`PointIndex`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the slice the index was built from.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub distance_sq: f64,
}

impl Neighbor {
    /// Euclidean distance to the query.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}

/// Nearest-neighbour index over a fixed set of points.
///
/// # Example
///
/// ```
/// use road_transform::PointIndex;
/// use road_types::Point3;
///
/// // 100 points on one height, which a plain kd-tree bucket cannot split
/// let points: Vec<Point3<f64>> = (0..100).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
/// let index = PointIndex::new(&points);
///
/// let hit = index.nearest(&Point3::new(41.2, 0.0, 0.0)).unwrap();
/// assert_eq!(hit.index, 41);
/// assert_eq!(index.within(&Point3::new(50.0, 0.0, 0.0), 1.5).len(), 3);
/// ```
pub struct PointIndex {
    tree: KdTree<f64, 3>,
    frame: Rotation3<f64>,
    /// Source indices per distinct position; tree items index this.
    groups: Vec<Vec<usize>>,
    len: usize,
}

impl std::fmt::Debug for PointIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointIndex")
            .field("len", &self.len)
            .field("distinct", &self.groups.len())
            .finish_non_exhaustive()
    }
}

impl PointIndex {
    /// Build an index over `points`. Query results refer to positions in
    /// this slice.
    #[must_use]
    pub fn new(points: &[Point3<f64>]) -> Self {
        Self::from_iter(points.iter())
    }

    /// Build an index from borrowed points.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let frame = Rotation3::from_euler_angles(0.5237, 0.7411, 0.2963);
        let mut tree: KdTree<f64, 3> = KdTree::new();
        let mut slots: HashMap<[u64; 3], usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut len = 0;

        for (i, p) in points.into_iter().enumerate() {
            if !p.coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            len += 1;
            // Adding +0.0 folds -0.0 into +0.0
            let bits = [p.x + 0.0, p.y + 0.0, p.z + 0.0].map(f64::to_bits);
            match slots.entry(bits) {
                Entry::Occupied(slot) => groups[*slot.get()].push(i),
                Entry::Vacant(slot) => {
                    let group = groups.len();
                    tree.add(&Self::key(&frame, p), group as u64);
                    groups.push(vec![i]);
                    slot.insert(group);
                }
            }
        }
        Self { tree, frame, groups, len }
    }

    fn key(frame: &Rotation3<f64>, p: &Point3<f64>) -> [f64; 3] {
        let r: Vector3<f64> = frame * p.coords;
        [r.x, r.y, r.z]
    }

    #[allow(clippy::cast_possible_truncation)]
    fn members(&self, item: u64) -> &[usize] {
        self.groups.get(item as usize).map_or(&[], Vec::as_slice)
    }

    fn expand(&self, distance_sq: f64, item: u64) -> impl Iterator<Item = Neighbor> + '_ {
        self.members(item)
            .iter()
            .map(move |&index| Neighbor { index, distance_sq })
    }

    /// Number of indexed points, counting coincident points separately.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The closest indexed point, `None` for an empty index.
    ///
    /// Among coincident points the one listed first wins.
    #[must_use]
    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbor> {
        if self.is_empty() {
            return None;
        }
        let hit = self.tree.nearest_one::<SquaredEuclidean>(&Self::key(&self.frame, query));
        self.expand(hit.distance, hit.item).next()
    }

    /// The `k` closest points, nearest first.
    #[must_use]
    pub fn nearest_n(&self, query: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        // Every distinct position stands for at least one point
        self.tree
            .nearest_n::<SquaredEuclidean>(&Self::key(&self.frame, query), k.min(self.groups.len()))
            .into_iter()
            .flat_map(|n| self.expand(n.distance, n.item))
            .take(k)
            .collect()
    }

    /// Every point within `radius` of the query, nearest first.
    #[must_use]
    pub fn within(&self, query: &Point3<f64>, radius: f64) -> Vec<Neighbor> {
        if self.is_empty() || radius < 0.0 {
            return Vec::new();
        }
        self.tree
            .within::<SquaredEuclidean>(&Self::key(&self.frame, query), radius * radius)
            .into_iter()
            .flat_map(|n| self.expand(n.distance, n.item))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_grid(n: i32) -> Vec<Point3<f64>> {
        (0..n)
            .flat_map(|i| (0..n).map(move |k| Point3::new(f64::from(i), 0.0, f64::from(k))))
            .collect()
    }

    #[test]
    fn flat_grid_builds_and_queries() {
        let points = flat_grid(40);
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 1600);

        let hit = index.nearest(&Point3::new(12.1, 0.3, 7.9)).unwrap();
        assert_eq!(points[hit.index], Point3::new(12.0, 0.0, 8.0));
        assert_relative_eq!(hit.distance_sq, 0.01 + 0.09 + 0.01, epsilon = 1e-9);
    }

    #[test]
    fn nearest_n_is_sorted() {
        let points = flat_grid(10);
        let index = PointIndex::new(&points);
        let hits = index.nearest_n(&Point3::new(5.0, 0.0, 5.0), 5);
        assert_eq!(hits.len(), 5);
        assert_relative_eq!(hits[0].distance_sq, 0.0, epsilon = 1e-9);
        assert!(hits.windows(2).all(|w| w[0].distance_sq <= w[1].distance_sq + 1e-12));
        assert!(hits[1..].iter().all(|n| (n.distance() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn within_radius() {
        let index = PointIndex::new(&flat_grid(10));
        assert_eq!(index.within(&Point3::new(5.0, 0.0, 5.0), 1.01).len(), 5);
        assert!(index.within(&Point3::new(50.0, 0.0, 50.0), 1.0).is_empty());
    }

    #[test]
    fn empty_index() {
        let index = PointIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.nearest(&Point3::origin()).is_none());
        assert!(index.nearest_n(&Point3::origin(), 3).is_empty());
    }

    #[test]
    fn coincident_points_share_an_entry() {
        // More copies of one position than a kd-tree bucket holds
        let mut points = vec![Point3::new(1.0, 2.0, 3.0); 64];
        points.extend(flat_grid(5));
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 89);

        let hit = index.nearest(&Point3::new(1.0, 2.0, 3.1)).unwrap();
        assert_eq!(hit.index, 0);
        assert_relative_eq!(hit.distance(), 0.1, epsilon = 1e-9);

        let copies = index.within(&Point3::new(1.0, 2.0, 3.0), 0.5);
        let mut found: Vec<usize> = copies.iter().map(|n| n.index).collect();
        found.sort_unstable();
        assert_eq!(found, (0..64).collect::<Vec<_>>());

        let hits = index.nearest_n(&Point3::new(1.0, 2.0, 3.0), 70);
        assert_eq!(hits.len(), 70);
        assert!(hits[..64].iter().all(|n| n.index < 64));
        assert!(hits.windows(2).all(|w| w[0].distance_sq <= w[1].distance_sq + 1e-12));
    }

    #[test]
    fn signed_zero_is_one_position() {
        let points = vec![Point3::new(0.0, 0.0, 0.0); 40]
            .into_iter()
            .chain(std::iter::repeat(Point3::new(-0.0, 0.0, -0.0)).take(40))
            .collect::<Vec<_>>();
        let index = PointIndex::new(&points);
        assert_eq!(index.within(&Point3::origin(), 0.1).len(), 80);
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(5.0, f64::INFINITY, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 2);
        assert_eq!(index.nearest(&Point3::new(1.9, 0.0, 0.0)).unwrap().index, 3);
        assert_eq!(index.nearest_n(&Point3::origin(), 4).len(), 2);

        let only_nan = PointIndex::new(&[Point3::new(f64::NAN, f64::NAN, f64::NAN)]);
        assert!(only_nan.is_empty());
        assert!(only_nan.nearest(&Point3::origin()).is_none());
    }
}
