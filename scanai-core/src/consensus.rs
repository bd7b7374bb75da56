use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use scanai_proto::{BBox, ClassTable, Detection};
use serde::Serialize;

/// `Stopped -> Running` on `start`, `Running -> Stopped` on `stop`.
/// `last_stable_snapshot` survives a stop/start pair within the same
/// process; only an explicit reset clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusState {
    Stopped,
    Running,
}

struct WindowEntry {
    frame_id: u64,
    class_name: String,
    count: i64,
    boxes: Vec<BBox>,
    confidences: Vec<f64>,
    received_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishItem {
    pub id: i64,
    pub label: String,
    pub qty: i64,
    pub conf: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishPayload {
    pub t: i64,
    pub status: &'static str,
    pub items: Vec<PublishItem>,
}

/// Sliding-window majority-vote stabilizer: buffers per-class object
/// counts observed in recent detection responses, filters out noisy
/// or unstable classes, and resolves the remaining ones to a single
/// published count per tick.
pub struct Consensus {
    frames: VecDeque<(u64, Instant)>,
    entries: Vec<WindowEntry>,
    next_frame_id: u64,
    last_stable_snapshot: HashMap<String, i64>,
    state: ConsensusState,
    window: Duration,
    presence_threshold: f64,
    stability_iou_threshold: f64,
    stability_presence_threshold: f64,
    soft_carry_enabled: bool,
    published_total: u64,
    dropped_classes_total: u64,
}

impl Consensus {
    pub fn new(
        window: Duration,
        presence_threshold: f64,
        stability_iou_threshold: f64,
        stability_presence_threshold: f64,
        soft_carry_enabled: bool,
    ) -> Self {
        Self {
            frames: VecDeque::new(),
            entries: Vec::new(),
            next_frame_id: 0,
            last_stable_snapshot: HashMap::new(),
            state: ConsensusState::Stopped,
            window,
            presence_threshold,
            stability_iou_threshold,
            stability_presence_threshold,
            soft_carry_enabled,
            published_total: 0,
            dropped_classes_total: 0,
        }
    }

    pub fn state(&self) -> ConsensusState {
        self.state
    }

    pub fn published_total(&self) -> u64 {
        self.published_total
    }

    pub fn dropped_classes_total(&self) -> u64 {
        self.dropped_classes_total
    }

    pub fn start(&mut self) {
        self.state = ConsensusState::Running;
    }

    /// Clears the window buffer. `last_stable_snapshot` is untouched:
    /// it is process lifetime, not tick-timer lifetime.
    pub fn stop(&mut self) {
        self.state = ConsensusState::Stopped;
        self.frames.clear();
        self.entries.clear();
    }

    pub fn reset_stable_snapshot(&mut self) {
        self.last_stable_snapshot.clear();
    }

    /// Buffers one detection response's objects, grouped by class,
    /// as a single time-stamped frame snapshot.
    pub fn enqueue_frame(&mut self, detections: &[Detection], received_at: Instant) -> u64 {
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.push_back((frame_id, received_at));

        let mut by_class: HashMap<&str, (i64, Vec<BBox>, Vec<f64>)> = HashMap::new();
        for detection in detections {
            let entry = by_class
                .entry(detection.class_name.as_str())
                .or_insert_with(|| (0, Vec::new(), Vec::new()));
            entry.0 += 1;
            entry.1.push(detection.bbox.clone());
            entry.2.push(detection.confidence);
        }

        for (class_name, (count, boxes, confidences)) in by_class {
            self.entries.push(WindowEntry {
                frame_id,
                class_name: class_name.to_string(),
                count,
                boxes,
                confidences,
                received_at,
            });
        }

        frame_id
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(&(_, ts)) = self.frames.front() {
            if now.duration_since(ts) > self.window {
                self.frames.pop_front();
            } else {
                break;
            }
        }
        let window = self.window;
        self.entries
            .retain(|e| now.duration_since(e.received_at) <= window);
    }

    /// Evicts stale entries and, if anything remains, computes and
    /// returns this tick's publication payload. `now` drives window
    /// math; `now_ms` is the wall-clock timestamp stamped on the
    /// payload.
    pub fn tick(&mut self, now: Instant, now_ms: i64, class_table: &ClassTable) -> Option<PublishPayload> {
        self.evict_stale(now);
        if self.frames.is_empty() {
            return None;
        }

        let total_snapshots = self.frames.len() as f64;
        let classes: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.class_name.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut items = Vec::new();

        for class_name in classes {
            let mut class_entries: Vec<&WindowEntry> = self
                .entries
                .iter()
                .filter(|e| e.class_name == class_name)
                .collect();
            class_entries.sort_by_key(|e| e.frame_id);

            let snapshots_with_presence = class_entries.iter().filter(|e| e.count >= 1).count() as f64;
            let presence = snapshots_with_presence / total_snapshots;

            let previously_stable = self.last_stable_snapshot.get(class_name).copied();
            if presence < self.presence_threshold {
                if self.soft_carry_enabled && previously_stable.is_some() {
                    self.last_stable_snapshot.insert(class_name.to_string(), 0);
                } else {
                    self.last_stable_snapshot.remove(class_name);
                }
                self.dropped_classes_total += 1;
                continue;
            }

            let boxes: Vec<&BBox> = class_entries.iter().flat_map(|e| e.boxes.iter()).collect();
            if boxes.len() >= 2 {
                let mut ious = Vec::with_capacity(boxes.len() - 1);
                for pair in boxes.windows(2) {
                    ious.push(iou(pair[0], pair[1]));
                }
                let avg_iou = ious.iter().sum::<f64>() / ious.len() as f64;
                if avg_iou < self.stability_iou_threshold && presence < self.stability_presence_threshold {
                    self.last_stable_snapshot.remove(class_name);
                    self.dropped_classes_total += 1;
                    continue;
                }
            }

            // One count per snapshot in the window, not just the
            // snapshots that actually contained this class: a frame
            // with no detection of `class_name` counts as 0 toward
            // the vote, per the "collect its count across snapshots
            // (missing = 0)" rule.
            let counts: Vec<i64> = self
                .frames
                .iter()
                .map(|&(frame_id, _)| {
                    class_entries
                        .iter()
                        .find(|e| e.frame_id == frame_id)
                        .map(|e| e.count)
                        .unwrap_or(0)
                })
                .collect();
            let chosen = majority_vote(&counts, previously_stable);

            let confidences: Vec<f64> = class_entries
                .iter()
                .flat_map(|e| e.confidences.iter().copied())
                .collect();
            let mean_conf = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };

            self.last_stable_snapshot.insert(class_name.to_string(), chosen);

            if chosen > 0 {
                items.push(PublishItem {
                    id: class_table.id_for_label(class_name),
                    label: class_name.to_string(),
                    qty: chosen,
                    conf: mean_conf,
                });
            }
        }

        self.published_total += 1;
        Some(PublishPayload {
            t: now_ms,
            status: "active",
            items,
        })
    }
}

/// Picks the most frequent value in `counts`. Ties prefer
/// `previously_stable` if it's among the tied values, else the tied
/// value closest to the list's median (ties within that broken toward
/// the smaller value, for determinism).
fn majority_vote(counts: &[i64], previously_stable: Option<i64>) -> i64 {
    let mut frequency: HashMap<i64, usize> = HashMap::new();
    for &c in counts {
        *frequency.entry(c).or_insert(0) += 1;
    }
    let max_freq = *frequency.values().max().unwrap_or(&0);
    let mut tied: Vec<i64> = frequency
        .iter()
        .filter(|&(_, &freq)| freq == max_freq)
        .map(|(&value, _)| value)
        .collect();
    tied.sort_unstable();

    if tied.len() == 1 {
        return tied[0];
    }

    if let Some(stable) = previously_stable {
        if tied.contains(&stable) {
            return stable;
        }
    }

    let median = median_of(counts);
    tied.into_iter()
        .min_by(|a, b| {
            let da = (*a as f64 - median).abs();
            let db = (*b as f64 - median).abs();
            da.partial_cmp(&db).unwrap().then(a.cmp(b))
        })
        .unwrap()
}

fn median_of(values: &[i64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    }
}

/// Intersection-over-union for two half-open-extent boxes. Zero when
/// the boxes don't overlap.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    let a_x2 = a.x + a.w;
    let a_y2 = a.y + a.h;
    let b_x2 = b.x + b.w;
    let b_y2 = b.y + b.h;

    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a_x2.min(b_x2);
    let iy2 = a_y2.min(b_y2);

    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let intersection = iw * ih;
    if intersection <= 0.0 {
        return 0.0;
    }

    let union = a.w * a.h + b.w * b.h - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_name: &str, confidence: f64, bbox: BBox) -> Detection {
        Detection {
            class_name: class_name.to_string(),
            confidence,
            bbox,
        }
    }

    fn unit_box() -> BBox {
        BBox { x: 0.0, y: 0.0, w: 10.0, h: 10.0 }
    }

    fn consensus() -> Consensus {
        Consensus::new(Duration::from_millis(200), 0.30, 0.30, 0.50, true)
    }

    #[test]
    fn iou_identical_boxes_is_one() {
        assert_eq!(iou(&unit_box(), &unit_box()), 1.0);
    }

    #[test]
    fn iou_disjoint_boxes_is_zero() {
        let a = BBox { x: 0.0, y: 0.0, w: 10.0, h: 10.0 };
        let b = BBox { x: 100.0, y: 100.0, w: 10.0, h: 10.0 };
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn single_label_stable_window_publishes_exact_count() {
        let mut c = consensus();
        c.start();
        let class_table = ClassTable::default_table();
        let start = Instant::now();
        for i in 0..4 {
            let frame = vec![
                det("cucur", 0.9, unit_box()),
                det("cucur", 0.9, unit_box()),
                det("cucur", 0.9, unit_box()),
            ];
            c.enqueue_frame(&frame, start + Duration::from_millis(i * 50));
        }
        let payload = c
            .tick(start + Duration::from_millis(160), 1_700_000_000_000, &class_table)
            .unwrap();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].label, "cucur");
        assert_eq!(payload.items[0].qty, 3);
    }

    #[test]
    fn noisy_count_publishes_majority() {
        let mut c = consensus();
        c.start();
        let class_table = ClassTable::default_table();
        let start = Instant::now();
        for (i, count) in [5, 5, 5, 7, 5].into_iter().enumerate() {
            let frame: Vec<Detection> = (0..count)
                .map(|_| det("lemper", 0.8, unit_box()))
                .collect();
            c.enqueue_frame(&frame, start + Duration::from_millis(i as u64 * 40));
        }
        let payload = c
            .tick(start + Duration::from_millis(160), 0, &class_table)
            .unwrap();
        assert_eq!(payload.items[0].qty, 5);
    }

    #[test]
    fn tie_is_broken_by_stable_history() {
        let mut c = consensus();
        c.start();
        c.last_stable_snapshot.insert("wajik".to_string(), 6);
        let class_table = ClassTable::default_table();
        let start = Instant::now();
        for (i, count) in [6, 7, 6, 7].into_iter().enumerate() {
            let frame: Vec<Detection> = (0..count)
                .map(|_| det("wajik", 0.7, unit_box()))
                .collect();
            c.enqueue_frame(&frame, start + Duration::from_millis(i as u64 * 40));
        }
        let payload = c
            .tick(start + Duration::from_millis(160), 0, &class_table)
            .unwrap();
        assert_eq!(payload.items[0].qty, 6);
    }

    #[test]
    fn partial_presence_pads_missing_frames_with_zero_before_voting() {
        // 5 of 10 snapshots report "kacang" at count 2; the other 5
        // report nothing. Presence = 0.5, clearing both the presence
        // and stability filters, but the vote must still be taken
        // over [2,2,2,2,2,0,0,0,0,0] (a tie), not over [2,2,2,2,2]
        // (a clean majority) — the absent snapshots count as 0.
        let mut c = consensus();
        c.start();
        let class_table = ClassTable::default_table();
        let start = Instant::now();
        for i in 0..10u64 {
            let frame = if i % 2 == 0 {
                vec![det("kacang", 0.8, unit_box()), det("kacang", 0.8, unit_box())]
            } else {
                vec![]
            };
            c.enqueue_frame(&frame, start + Duration::from_millis(i * 15));
        }
        let payload = c
            .tick(start + Duration::from_millis(160), 0, &class_table)
            .unwrap();
        assert!(payload.items.iter().all(|item| item.label != "kacang"));
        assert_eq!(c.last_stable_snapshot.get("kacang"), Some(&0));
    }

    #[test]
    fn transient_glitch_is_dropped_by_presence_filter() {
        let mut c = consensus();
        c.start();
        let class_table = ClassTable::default_table();
        let start = Instant::now();
        c.enqueue_frame(&[det("kue ku", 0.6, unit_box())], start);
        for i in 1..5 {
            c.enqueue_frame(&[], start + Duration::from_millis(i * 40));
        }
        let payload = c
            .tick(start + Duration::from_millis(160), 0, &class_table)
            .unwrap();
        assert!(payload.items.iter().all(|item| item.label != "kue ku"));
    }

    #[test]
    fn stopping_clears_window_but_keeps_stable_history() {
        let mut c = consensus();
        c.start();
        c.last_stable_snapshot.insert("wajik".to_string(), 6);
        c.enqueue_frame(&[det("wajik", 0.5, unit_box())], Instant::now());
        c.stop();
        assert_eq!(c.entries.len(), 0);
        assert_eq!(c.last_stable_snapshot.get("wajik"), Some(&6));
    }
}
