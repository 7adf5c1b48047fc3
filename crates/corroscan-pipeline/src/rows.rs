//! Row-wise raster traversal, parallel when the `parallel` feature is on.
//!
//! Every per-pixel stage (color conversion, thresholding, overlay recolor)
//! writes one output row from one input row with no cross-row reads, so
//! rows can be handed to `rayon` without any synchronization.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Apply `f` to each `(output_row, input_row)` pair.
///
/// `dst` and `src` are split into rows of `dst_stride` and `src_stride`
/// elements. Zero strides (zero-width images) are a no-op.
pub(crate) fn zip_rows<F>(dst: &mut [u8], dst_stride: usize, src: &[u8], src_stride: usize, f: F)
where
    F: Fn(&mut [u8], &[u8]) + Send + Sync,
{
    if dst_stride == 0 || src_stride == 0 {
        return;
    }
    debug_assert_eq!(
        dst.len() / dst_stride,
        src.len() / src_stride,
        "row counts differ",
    );

    #[cfg(feature = "parallel")]
    dst.par_chunks_mut(dst_stride)
        .zip(src.par_chunks(src_stride))
        .for_each(|(out, row)| f(out, row));

    #[cfg(not(feature = "parallel"))]
    dst.chunks_mut(dst_stride)
        .zip(src.chunks(src_stride))
        .for_each(|(out, row)| f(out, row));
}
