use std::cmp::Reverse;

use crate::streams::StreamDescriptor;

pub const DEFAULT_VIDEO_CONTAINER: &str = "mp4";

/// Picks the muxed variant to offer as the direct video link.
///
/// Variants whose container hint contains `container` (case-insensitive) are
/// ranked by quality, highest first. When none match, the upstream's first
/// entry is returned as-is.
pub fn pick_best_muxed<'a>(
    variants: &'a [StreamDescriptor],
    container: &str,
) -> Option<&'a StreamDescriptor> {
    let wanted = container.to_ascii_lowercase();
    let mut matching = variants
        .iter()
        .filter(|v| v.container_hint().to_ascii_lowercase().contains(&wanted))
        .collect::<Vec<_>>();

    // sort_by_key is stable, so equal qualities keep upstream order
    matching.sort_by_key(|v| Reverse(v.quality_or_zero()));

    matching.first().copied().or_else(|| variants.first())
}

/// Picks the audio-only variant with the highest bitrate.
pub fn pick_best_audio(variants: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    let mut ranked = variants.iter().collect::<Vec<_>>();
    ranked.sort_by_key(|v| Reverse(v.bitrate_or_zero()));
    ranked.first().copied()
}
