//! IoU track persistence.
//!
//! Gives detections a stable `track_id` across frames by greedily matching each new box
//! to the live track of the same label with the highest overlap. Tracks that go
//! unmatched for `max_missed` frames are dropped. This is identity bookkeeping for
//! annotation and logs, not a motion model.

use crate::detect::result::{BoundingBox, Detection};

pub const DEFAULT_MATCH_IOU: f32 = 0.3;
pub const DEFAULT_MAX_MISSED: u32 = 30;

#[derive(Clone, Debug)]
struct Track {
    id: u64,
    label: String,
    bbox: BoundingBox,
    missed: u32,
}

#[derive(Debug)]
pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u64,
    match_iou: f32,
    max_missed: u32,
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_IOU, DEFAULT_MAX_MISSED)
    }
}

impl IouTracker {
    pub fn new(match_iou: f32, max_missed: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            match_iou,
            max_missed,
        }
    }

    /// Assign identities in place. Detections that already carry one are left alone.
    pub fn assign(&mut self, detections: &mut [Detection]) {
        let mut matched = vec![false; self.tracks.len()];

        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| {
            detections[b]
                .confidence
                .total_cmp(&detections[a].confidence)
        });

        for idx in order {
            let det = &mut detections[idx];
            if det.track_id.is_some() {
                continue;
            }
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, track)| !matched[*i] && track.label == det.label)
                .map(|(i, track)| (i, track.bbox.iou(&det.bbox)))
                .filter(|(_, iou)| *iou >= self.match_iou)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best {
                Some((i, _)) => {
                    matched[i] = true;
                    let track = &mut self.tracks[i];
                    track.bbox = det.bbox;
                    track.missed = 0;
                    det.track_id = Some(track.id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        label: det.label.clone(),
                        bbox: det.bbox,
                        missed: 0,
                    });
                    matched.push(true);
                    det.track_id = Some(id);
                }
            }
        }

        for (track, was_matched) in self.tracks.iter_mut().zip(&matched) {
            if !was_matched {
                track.missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|track| track.missed <= max_missed);
    }

    /// Forget all tracks and restart numbering.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x: f32) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(x, 0.2, 0.2, 0.2))
    }

    #[test]
    fn overlapping_boxes_keep_their_identity() {
        let mut tracker = IouTracker::default();
        let mut first = vec![det("person", 0.10), det("car", 0.60)];
        tracker.assign(&mut first);
        assert_eq!(first[0].track_id, Some(1));
        assert_eq!(first[1].track_id, Some(2));

        let mut second = vec![det("car", 0.62), det("person", 0.12)];
        tracker.assign(&mut second);
        assert_eq!(second[0].track_id, Some(2));
        assert_eq!(second[1].track_id, Some(1));
    }

    #[test]
    fn label_change_starts_a_new_track() {
        let mut tracker = IouTracker::default();
        let mut first = vec![det("person", 0.10)];
        tracker.assign(&mut first);
        let mut second = vec![det("dog", 0.10)];
        tracker.assign(&mut second);
        assert_eq!(second[0].track_id, Some(2));
    }

    #[test]
    fn stale_tracks_expire() {
        let mut tracker = IouTracker::new(0.3, 1);
        tracker.assign(&mut [det("person", 0.10)]);
        tracker.assign(&mut []);
        assert_eq!(tracker.live_tracks(), 1);
        tracker.assign(&mut []);
        assert_eq!(tracker.live_tracks(), 0);
    }

    #[test]
    fn reset_restarts_numbering() {
        let mut tracker = IouTracker::default();
        tracker.assign(&mut [det("person", 0.10)]);
        tracker.reset();
        let mut again = vec![det("person", 0.70)];
        tracker.assign(&mut again);
        assert_eq!(again[0].track_id, Some(1));
    }
}
