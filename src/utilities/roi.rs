use std::collections::VecDeque;

use super::mask::{Mask, MaskedImage};

/// Regions of interest of an image
///
/// Each region is a 4-connected set of valid pixels. Regions are numbered in
/// the order they are met while scanning the image row after row.
pub fn roi_generator(image: &MaskedImage) -> Vec<Mask> {
    let (nrows, ncols) = image.shape();
    let mut labels = vec![0usize; nrows * ncols];
    let at = |i: usize, j: usize| i * ncols + j;
    let mut n_label = 0;
    let mut queue = VecDeque::new();
    for i in 0..nrows {
        for j in 0..ncols {
            if image.mask[(i, j)] || labels[at(i, j)] > 0 {
                continue;
            }
            n_label += 1;
            labels[at(i, j)] = n_label;
            queue.push_back((i, j));
            while let Some((i, j)) = queue.pop_front() {
                let neighbors = [
                    (i.wrapping_sub(1), j),
                    (i + 1, j),
                    (i, j.wrapping_sub(1)),
                    (i, j + 1),
                ];
                for (ni, nj) in neighbors {
                    if ni < nrows && nj < ncols && !image.mask[(ni, nj)] && labels[at(ni, nj)] == 0
                    {
                        labels[at(ni, nj)] = n_label;
                        queue.push_back((ni, nj));
                    }
                }
            }
        }
    }
    log::debug!("{} regions of interest found", n_label);
    (1..=n_label)
        .map(|label| Mask::from_fn(nrows, ncols, |i, j| labels[at(i, j)] != label))
        .collect()
}
