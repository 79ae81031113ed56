//! Tile grids for splitting pixel work between parallel writers.

use super::image::Window;

/// Cover a `width` x `height` image with tiles of at most `xtile` x `ytile`
/// pixels, in row-major order. Edge tiles are clipped to the image.
pub fn generate_tiles(width: u64, height: u64, xtile: u64, ytile: u64) -> Vec<Window> {
    if width == 0 || height == 0 || xtile == 0 || ytile == 0 {
        return Vec::new();
    }
    let mut tiles = Vec::with_capacity((width.div_ceil(xtile) * height.div_ceil(ytile)) as usize);
    for row in (0..height).step_by(ytile as usize) {
        for col in (0..width).step_by(xtile as usize) {
            tiles.push(Window::new(row..(row + ytile).min(height), col..(col + xtile).min(width)));
        }
    }
    tiles
}

/// Tiles assigned to `rank` out of `ranks` writers, dealt round-robin.
pub fn rank_tiles(tiles: &[Window], rank: usize, ranks: usize) -> Vec<Window> {
    if ranks == 0 {
        return Vec::new();
    }
    tiles.iter().skip(rank).step_by(ranks).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tiles() {
        let tiles = generate_tiles(10, 7, 4, 5);
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[0], Window::new(0..5, 0..4));
        assert_eq!(tiles[2], Window::new(0..5, 8..10));
        assert_eq!(tiles[5], Window::new(5..7, 8..10));
        let area: u64 = tiles.iter().map(|t| t.width() * t.height()).sum();
        assert_eq!(area, 70);
        assert!(generate_tiles(10, 10, 0, 5).is_empty());
    }

    #[test]
    fn test_rank_tiles_partition() {
        let tiles = generate_tiles(9, 9, 3, 3);
        let mut seen: Vec<Window> = (0..4).flat_map(|r| rank_tiles(&tiles, r, 4)).collect();
        assert_eq!(seen.len(), tiles.len());
        seen.sort_by_key(|w| (w.rows.start, w.cols.start));
        assert_eq!(seen, tiles);
        assert_eq!(rank_tiles(&tiles, 1, 4).len(), 2);
        assert!(rank_tiles(&tiles, 0, 0).is_empty());
    }
}
