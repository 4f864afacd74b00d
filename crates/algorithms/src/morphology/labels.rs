//! Connected-component operations on binary masks
//!
//! Components use 4-connectivity.

use std::collections::VecDeque;

use ndarray::Array2;

const NEIGHBORS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Label the 4-connected components of cells equal to `value`.
///
/// Returns one label per cell (0 = not part of any component, labels start
/// at 1) and the size of each component indexed by `label - 1`.
pub fn label_components(mask: &Array2<bool>, value: bool) -> (Array2<u32>, Vec<usize>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for start_r in 0..rows {
        for start_c in 0..cols {
            if mask[(start_r, start_c)] != value || labels[(start_r, start_c)] != 0 {
                continue;
            }
            let label = sizes.len() as u32 + 1;
            let mut size = 0usize;
            labels[(start_r, start_c)] = label;
            queue.push_back((start_r, start_c));

            while let Some((r, c)) = queue.pop_front() {
                size += 1;
                for &(dr, dc) in &NEIGHBORS {
                    let Some(idx) = super::erode::neighbor(r, c, dr, dc, rows, cols) else {
                        continue;
                    };
                    if mask[idx] == value && labels[idx] == 0 {
                        labels[idx] = label;
                        queue.push_back(idx);
                    }
                }
            }
            sizes.push(size);
        }
    }

    (labels, sizes)
}

/// Clear set components smaller than `min_size` cells.
pub fn remove_small_objects(mask: &Array2<bool>, min_size: usize) -> Array2<bool> {
    let (labels, sizes) = label_components(mask, true);
    labels.mapv(|l| l > 0 && sizes[(l - 1) as usize] >= min_size)
}

/// Set every unset region not connected to the grid border.
pub fn fill_holes(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let (labels, sizes) = label_components(mask, false);

    let mut touches_border = vec![false; sizes.len()];
    for ((r, c), &l) in labels.indexed_iter() {
        if l > 0 && (r == 0 || c == 0 || r + 1 == rows || c + 1 == cols) {
            touches_border[(l - 1) as usize] = true;
        }
    }

    let mut filled = mask.clone();
    for (v, &l) in filled.iter_mut().zip(labels.iter()) {
        if l > 0 && !touches_border[(l - 1) as usize] {
            *v = true;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_label_components_four_connected() {
        let mask = array![
            [true, false, true],
            [false, true, false],
            [true, true, false],
        ];
        let (labels, sizes) = label_components(&mask, true);
        // the diagonal touch does not connect
        assert_eq!(sizes, vec![1, 1, 3]);
        assert_eq!(labels[(1, 1)], labels[(2, 0)]);
        assert_ne!(labels[(0, 0)], labels[(1, 1)]);
    }

    #[test]
    fn test_remove_small_objects() {
        let mask = array![
            [true, true, false, false],
            [true, true, false, true],
            [false, false, false, false],
        ];
        let out = remove_small_objects(&mask, 4);
        assert_eq!(out.iter().filter(|&&v| v).count(), 4);
        assert!(!out[(1, 3)]);

        let none = remove_small_objects(&mask, 5);
        assert!(none.iter().all(|&v| !v));
    }

    #[test]
    fn test_fill_holes() {
        let mask = array![
            [true, true, true, false],
            [true, false, true, false],
            [true, true, true, false],
        ];
        let out = fill_holes(&mask);
        assert!(out[(1, 1)]);
        // background touching the border stays unset
        assert!(!out[(0, 3)]);
        assert!(!out[(1, 3)]);
    }
}
