use image::GrayImage;

/// Maps an out-of-range index back into `0..len` by mirroring around the edge
/// pixel without repeating it (`dcb|abcd|cba`).
pub(crate) fn reflect_101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mirrored = if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    };
    mirrored.clamp(0, len - 1) as usize
}

/// Absolute response of the 4-neighbour Laplacian
/// `[0 1 0; 1 -4 1; 0 1 0]`, row-major, same size as `img`.
///
/// Borders reflect inside the image itself, so a crop is filtered as if it
/// were a standalone picture.
pub fn laplacian_abs(img: &GrayImage) -> Vec<f64> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let at = |x: i64, y: i64| -> f64 {
        img.get_pixel(reflect_101(x, w) as u32, reflect_101(y, h) as u32).0[0] as f64
    };

    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let response =
                at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1) - 4.0 * at(x, y);
            out.push(response.abs());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn flat_image_has_no_response() {
        let img = GrayImage::from_pixel(9, 7, Luma([100]));
        assert!(laplacian_abs(&img).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn isolated_spike_rings_its_neighbours() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([0]));
        img.put_pixel(2, 2, Luma([10]));
        let lap = laplacian_abs(&img);
        assert_eq!(lap[2 * 5 + 2], 40.0);
        assert_eq!(lap[2 * 5 + 1], 10.0);
        assert_eq!(lap[1 * 5 + 2], 10.0);
        assert_eq!(lap[0], 0.0);
        assert_eq!(lap.iter().sum::<f64>(), 80.0);
    }

    #[test]
    fn edge_pixels_mirror_without_repeating() {
        // Column 0 bright: at x=0 the left neighbour mirrors to x=1 (dark).
        let mut img = GrayImage::from_pixel(4, 3, Luma([0]));
        for y in 0..3 {
            img.put_pixel(0, y, Luma([8]));
        }
        let lap = laplacian_abs(&img);
        assert_eq!(lap[4], 16.0); // (0,1): 8 + 8 + 0 + 0 - 32
        assert_eq!(lap[5], 8.0); // (1,1): neighbour at x=0
    }

    #[test]
    fn single_pixel_image_is_flat() {
        let img = GrayImage::from_pixel(1, 1, Luma([255]));
        assert_eq!(laplacian_abs(&img), vec![0.0]);
    }

    #[test]
    fn reflect_index_math() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
    }
}
