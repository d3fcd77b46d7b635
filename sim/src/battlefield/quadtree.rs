//! Point quad-tree over the battlefield grid.
//!
//! Nodes live in an arena and refer to their children by index; freed nodes
//! are recycled. A leaf splits when it holds more than `capacity` items and
//! a branch collapses back into a leaf once its subtree fits again.

use super::grid::{GridPoint, GRID_EXTENT};

#[derive(Debug, Clone)]
enum Contents<T> {
    Leaf(Vec<(T, GridPoint)>),
    Branch([usize; 4]),
}

#[derive(Debug, Clone)]
struct Node<T> {
    x0: u32,
    y0: u32,
    size: u32,
    count: usize,
    contents: Contents<T>,
}

impl<T> Node<T> {
    fn leaf(x0: u32, y0: u32, size: u32) -> Self {
        Self { x0, y0, size, count: 0, contents: Contents::Leaf(Vec::new()) }
    }

    /// Child quadrant index for `p`; only meaningful on branches.
    fn quadrant(&self, p: GridPoint) -> usize {
        let half = self.size / 2;
        let east = (p.x - self.x0 >= half) as usize;
        let north = (p.y - self.y0 >= half) as usize;
        east | (north << 1)
    }

    /// Squared distance from `p` to the closest point of this node's square.
    fn distance2_to(&self, p: GridPoint) -> u64 {
        let axis = |v: u32, lo: u32, size: u32| -> u64 {
            let hi = lo as u64 + size as u64 - 1;
            let v = v as u64;
            if v < lo as u64 {
                lo as u64 - v
            } else if v > hi {
                v - hi
            } else {
                0
            }
        };
        let dx = axis(p.x, self.x0, self.size);
        let dy = axis(p.y, self.y0, self.size);
        dx * dx + dy * dy
    }

    fn intersects_rect(&self, min: GridPoint, max: GridPoint) -> bool {
        let hx = self.x0 as u64 + self.size as u64 - 1;
        let hy = self.y0 as u64 + self.size as u64 - 1;
        (min.x as u64) <= hx && (max.x as u64) >= self.x0 as u64 && (min.y as u64) <= hy && (max.y as u64) >= self.y0 as u64
    }
}

/// Spatial index of `(id, point)` pairs.
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    capacity: usize,
}

const ROOT: usize = 0;

impl<T: Copy + PartialEq> QuadTree<T> {
    /// Index covering the whole grid with at most `capacity` items per leaf.
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: vec![Node::leaf(0, 0, GRID_EXTENT)],
            free: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.nodes[ROOT].count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live nodes (leaves and branches).
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    pub fn insert(&mut self, id: T, point: GridPoint) {
        self.insert_below(ROOT, id, point);
    }

    fn split(&mut self, index: usize) {
        let (x0, y0, half) = {
            let n = &self.nodes[index];
            (n.x0, n.y0, n.size / 2)
        };
        let items = match std::mem::replace(&mut self.nodes[index].contents, Contents::Branch([0; 4])) {
            Contents::Leaf(items) => items,
            Contents::Branch(children) => {
                self.nodes[index].contents = Contents::Branch(children);
                return;
            }
        };
        let children = [
            self.alloc(Node::leaf(x0, y0, half)),
            self.alloc(Node::leaf(x0 + half, y0, half)),
            self.alloc(Node::leaf(x0, y0 + half, half)),
            self.alloc(Node::leaf(x0 + half, y0 + half, half)),
        ];
        self.nodes[index].contents = Contents::Branch(children);
        self.nodes[index].count -= items.len();
        for (id, point) in items {
            self.insert_below(index, id, point);
        }
    }

    /// Insert into the subtree rooted at `index`.
    fn insert_below(&mut self, mut index: usize, id: T, point: GridPoint) {
        loop {
            self.nodes[index].count += 1;
            let next = match &self.nodes[index].contents {
                Contents::Branch(children) => Some(children[self.nodes[index].quadrant(point)]),
                Contents::Leaf(_) => None,
            };
            match next {
                Some(child) => index = child,
                None => {
                    let split = match &mut self.nodes[index].contents {
                        Contents::Leaf(items) => {
                            items.push((id, point));
                            items.len() > self.capacity
                        }
                        Contents::Branch(_) => false,
                    };
                    if split && self.nodes[index].size > 1 {
                        self.split(index);
                    }
                    return;
                }
            }
        }
    }

    /// Remove `id`, which must have been inserted at `point`. Returns whether
    /// it was found.
    pub fn remove(&mut self, id: T, point: GridPoint) -> bool {
        let mut path = Vec::new();
        let mut index = ROOT;
        loop {
            path.push(index);
            let next = match &self.nodes[index].contents {
                Contents::Branch(children) => children[self.nodes[index].quadrant(point)],
                Contents::Leaf(_) => break,
            };
            index = next;
        }

        let found = match &mut self.nodes[index].contents {
            Contents::Leaf(items) => match items.iter().position(|(i, p)| *i == id && *p == point) {
                Some(pos) => {
                    items.swap_remove(pos);
                    true
                }
                None => false,
            },
            Contents::Branch(_) => false,
        };
        if !found {
            return false;
        }

        for &node in &path {
            self.nodes[node].count -= 1;
        }
        // Collapse the highest ancestor whose subtree fits in one leaf.
        let fits = path
            .iter()
            .copied()
            .find(|&n| matches!(self.nodes[n].contents, Contents::Branch(_)) && self.nodes[n].count <= self.capacity);
        if let Some(node) = fits {
            self.collapse(node);
        }
        true
    }

    fn collapse(&mut self, index: usize) {
        let mut items = Vec::with_capacity(self.nodes[index].count);
        let mut stack = match &self.nodes[index].contents {
            Contents::Branch(children) => children.to_vec(),
            Contents::Leaf(_) => return,
        };
        while let Some(child) = stack.pop() {
            match std::mem::replace(&mut self.nodes[child].contents, Contents::Leaf(Vec::new())) {
                Contents::Leaf(mut leaf) => items.append(&mut leaf),
                Contents::Branch(grandchildren) => stack.extend_from_slice(&grandchildren),
            }
            self.free.push(child);
        }
        self.nodes[index].contents = Contents::Leaf(items);
    }

    /// Move `id` from `from` to `to`.
    pub fn relocate(&mut self, id: T, from: GridPoint, to: GridPoint) -> bool {
        if !self.remove(id, from) {
            return false;
        }
        self.insert(id, to);
        true
    }

    /// All items within `radius` of `center` (inclusive).
    pub fn query_circle(&self, center: GridPoint, radius: u32) -> Vec<(T, GridPoint)> {
        let r2 = (radius as u64) * (radius as u64);
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.count == 0 || node.distance2_to(center) > r2 {
                continue;
            }
            match &node.contents {
                Contents::Branch(children) => stack.extend_from_slice(children),
                Contents::Leaf(items) => {
                    out.extend(items.iter().copied().filter(|(_, p)| p.distance2(center) <= r2));
                }
            }
        }
        out
    }

    /// All items inside the axis-aligned rectangle `[min, max]` (inclusive).
    pub fn query_rect(&self, min: GridPoint, max: GridPoint) -> Vec<(T, GridPoint)> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.count == 0 || !node.intersects_rect(min, max) {
                continue;
            }
            match &node.contents {
                Contents::Branch(children) => stack.extend_from_slice(children),
                Contents::Leaf(items) => out.extend(
                    items
                        .iter()
                        .copied()
                        .filter(|(_, p)| p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y),
                ),
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.nodes.push(Node::leaf(0, 0, GRID_EXTENT));
    }
}
