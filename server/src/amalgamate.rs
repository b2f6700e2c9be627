//! One control request's full pipeline: select groups by mask, clip
//! their trajectories, colorize and encode each run, and stage the
//! records as transfer chunks for the target data channel.

use crate::buffer::ChunkBuffer;
use crate::clip::{clip_trajectory, Projection};
use log::{debug, warn};
use shared::wire;
use shared::{group_selected, palette, Dataset, GroupList, ViewRequest};

/// Bounds on how much work a single request may emit.
#[derive(Debug, Clone, Copy)]
pub struct AmalgamateLimits {
    /// Trajectories rendered per group.
    pub group_cap: usize,
    /// Longest run the record encoder accepts.
    pub max_run_points: usize,
}

impl Default for AmalgamateLimits {
    fn default() -> Self {
        Self {
            group_cap: 4,
            max_run_points: 10_000,
        }
    }
}

/// Processes one view request against the whole dataset. Every frame
/// produced, including the final forced flush, is handed to `sink` in
/// transmission order. Returns the number of records emitted; a record
/// that could not be staged is never counted.
///
/// Groups with exactly one member are never rendered. The accepted run
/// length is the configured maximum, further bounded by the longest
/// record the buffer can stage whole; runs beyond it are dropped with a
/// warning rather than truncated.
pub fn amalgamate(
    view: &ViewRequest,
    dataset: &Dataset,
    groups: &GroupList,
    limits: AmalgamateLimits,
    buffer: &mut ChunkBuffer,
    sink: &mut dyn FnMut(Vec<u8>),
) -> usize {
    debug_assert!(buffer.is_empty(), "previous request left staged bytes");
    let projection = Projection::new(view);
    let max_points = limits
        .max_run_points
        .min(wire::max_points_in(buffer.capacity()));
    let mut records = 0usize;

    stage(buffer, wire::STREAM_MAGIC, sink);
    for (index, group) in groups.groups.iter().enumerate() {
        if !group_selected(view.mask, index) {
            continue;
        }
        if group.members.len() == 1 {
            continue;
        }
        let color = palette::color_for_group(index);
        for &member in group.members.iter().take(limits.group_cap) {
            let Some(trajectory) = dataset.trajectories.get(member) else {
                warn!("group '{}' references missing trajectory {member}", group.name);
                continue;
            };
            for run in clip_trajectory(&projection, trajectory) {
                match wire::encode_record(color, &run, max_points) {
                    Ok(record) => {
                        if stage(buffer, &record, sink) {
                            records += 1;
                        }
                    }
                    Err(error) => {
                        warn!("dropping run from group '{}': {error}", group.name);
                    }
                }
            }
        }
    }
    if let Some(frame) = buffer.flush() {
        sink(frame);
    }
    debug!("amalgamation produced {records} records");
    records
}

fn stage(buffer: &mut ChunkBuffer, bytes: &[u8], sink: &mut dyn FnMut(Vec<u8>)) -> bool {
    match buffer.append(bytes) {
        Ok(Some(frame)) => {
            sink(frame);
            true
        }
        Ok(None) => true,
        Err(error) => {
            warn!("record skipped: {error}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Group, Point, Trajectory};

    fn view() -> ViewRequest {
        ViewRequest {
            view: Point::new(100, 100),
            frame_top: Point::new(0, 0),
            frame_bottom: Point::new(100, 100),
            resolution: 1,
            mask: u32::MAX,
        }
    }

    fn diagonal(offset: i32) -> Trajectory {
        Trajectory::new((0..6).map(|i| Point::new(offset + i, offset + i)).collect())
    }

    fn dataset() -> Dataset {
        Dataset {
            trajectories: vec![diagonal(1), diagonal(10), diagonal(20), diagonal(30)],
        }
    }

    fn groups() -> GroupList {
        GroupList {
            groups: vec![
                Group {
                    name: "pair".into(),
                    members: vec![0, 1],
                },
                Group {
                    name: "singleton".into(),
                    members: vec![2],
                },
                Group {
                    name: "other".into(),
                    members: vec![2, 3],
                },
            ],
        }
    }

    fn collect_payload(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = Vec::new();
        for frame in frames {
            let line_end = frame.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
            let part = &frame[line_end..frame.len() - 2];
            payload.extend_from_slice(wire::part_payload(part).unwrap());
        }
        payload
    }

    #[test]
    fn stream_opens_with_magic_and_decodes() {
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let records = amalgamate(
            &view(),
            &dataset(),
            &groups(),
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| frames.push(frame),
        );
        assert_eq!(records, 4);
        let payload = collect_payload(&frames);
        assert!(payload.starts_with(wire::STREAM_MAGIC));
        let (first, _) = wire::decode_record(&payload[4..]).unwrap();
        assert_eq!(first.color, palette::color_for_group(0));
        assert!(!first.points.is_empty());
    }

    #[test]
    fn singleton_groups_are_skipped() {
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let mut req = view();
        req.mask = 0b010; // only the singleton
        let records = amalgamate(
            &req,
            &dataset(),
            &groups(),
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| frames.push(frame),
        );
        assert_eq!(records, 0);
        // the stream still carries its preamble
        assert_eq!(collect_payload(&frames), wire::STREAM_MAGIC.to_vec());
    }

    #[test]
    fn mask_limits_rendered_groups() {
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let mut req = view();
        req.mask = 0b100; // only "other"
        let records = amalgamate(
            &req,
            &dataset(),
            &groups(),
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| frames.push(frame),
        );
        assert_eq!(records, 2);
        let payload = collect_payload(&frames);
        let (record, _) = wire::decode_record(&payload[4..]).unwrap();
        assert_eq!(record.color, palette::color_for_group(2));
    }

    #[test]
    fn group_cap_bounds_trajectories_per_group() {
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let limits = AmalgamateLimits {
            group_cap: 1,
            max_run_points: 10_000,
        };
        let mut req = view();
        req.mask = 0b001;
        let records = amalgamate(&req, &dataset(), &groups(), limits, &mut buffer, &mut |f| {
            frames.push(f)
        });
        assert_eq!(records, 1);
    }

    #[test]
    fn oversize_runs_are_dropped_not_truncated() {
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let limits = AmalgamateLimits {
            group_cap: 4,
            max_run_points: 2,
        };
        let mut req = view();
        req.mask = 0b001;
        let records = amalgamate(&req, &dataset(), &groups(), limits, &mut buffer, &mut |f| {
            frames.push(f)
        });
        assert_eq!(records, 0);
        assert_eq!(collect_payload(&frames), wire::STREAM_MAGIC.to_vec());
    }

    fn decode_all(payload: &[u8]) -> Vec<wire::Record> {
        let mut rest = &payload[wire::STREAM_MAGIC.len()..];
        let mut records = Vec::new();
        while !rest.is_empty() {
            let (record, used) = wire::decode_record(rest).unwrap();
            records.push(record);
            rest = &rest[used..];
        }
        records
    }

    #[test]
    fn reported_count_matches_emitted_records() {
        // zigzag samples never deduplicate, so each trajectory becomes
        // one 5000-point run: legal for the configured run limit but
        // too large to ever stage whole
        let zigzag: Vec<Point> = (0..5001)
            .map(|i| if i % 2 == 0 { Point::new(1, 1) } else { Point::new(2, 2) })
            .collect();
        let dataset = Dataset {
            trajectories: vec![
                Trajectory::new(zigzag.clone()),
                Trajectory::new(zigzag),
            ],
        };
        let list = GroupList {
            groups: vec![Group {
                name: "long".into(),
                members: vec![0, 1],
            }],
        };
        let mut buffer = ChunkBuffer::default();
        let mut frames = Vec::new();
        let records = amalgamate(
            &view(),
            &dataset,
            &list,
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| frames.push(frame),
        );
        let payload = collect_payload(&frames);
        assert_eq!(records, decode_all(&payload).len());
        assert_eq!(records, 0);
    }

    #[test]
    fn run_limit_is_bounded_by_buffer_capacity() {
        // a 64-byte buffer fits records of at most 14 points
        let mut buffer = ChunkBuffer::new(64, 32);
        let dataset = Dataset {
            trajectories: vec![
                Trajectory::new((0..21).map(|i| Point::new(i, i)).collect()),
                Trajectory::new(vec![Point::new(1, 1), Point::new(2, 2), Point::new(3, 3)]),
            ],
        };
        let list = GroupList {
            groups: vec![Group {
                name: "mixed".into(),
                members: vec![0, 1],
            }],
        };
        let mut frames = Vec::new();
        let records = amalgamate(
            &view(),
            &dataset,
            &list,
            AmalgamateLimits {
                group_cap: 4,
                max_run_points: 10_000,
            },
            &mut buffer,
            &mut |frame| frames.push(frame),
        );
        // the 20-point run is dropped, the 2-point run survives
        assert_eq!(records, 1);
        let payload = collect_payload(&frames);
        let decoded = decode_all(&payload);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].points.len(), 2);
    }

    #[test]
    fn back_to_back_requests_leave_no_leftover_bytes() {
        let mut buffer = ChunkBuffer::default();
        let mut first = Vec::new();
        amalgamate(
            &view(),
            &dataset(),
            &groups(),
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| first.push(frame),
        );
        assert!(buffer.is_empty());
        let mut second = Vec::new();
        amalgamate(
            &view(),
            &dataset(),
            &groups(),
            AmalgamateLimits::default(),
            &mut buffer,
            &mut |frame| second.push(frame),
        );
        assert!(buffer.is_empty());
        assert_eq!(collect_payload(&first), collect_payload(&second));
    }
}
