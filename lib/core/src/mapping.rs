//! Frame -> instance association, with or without sliding windows.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{Windowing, EPSILON};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameId, InstanceId};

/// A logical output unit; one bag row is produced per instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Window center, only set in windowing mode
    pub center: Option<f32>,
    pub labels: Vec<String>,
    /// Number of contributing frames
    pub num_frames: usize,
}

/// Result of instance mapping. Membership is fixed once built.
#[derive(Debug, Clone, Default)]
pub struct InstanceMap {
    instances: Vec<Instance>,
    frame_instances: Vec<SmallVec<[InstanceId; 4]>>,
    instance_frames: Vec<Vec<FrameId>>,
    frame_sources: Vec<usize>,
}

impl InstanceMap {
    #[inline]
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frame_instances.len()
    }

    #[inline]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    #[inline]
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    /// Instances the frame contributes to (empty for inactive frames)
    #[inline]
    pub fn instances_of(&self, frame: FrameId) -> &[InstanceId] {
        &self.frame_instances[frame.index()]
    }

    #[inline]
    pub fn frames_of(&self, instance: InstanceId) -> &[FrameId] {
        &self.instance_frames[instance.index()]
    }

    /// Index of the contiguous name run the frame belongs to; sequence
    /// statistics never cross a source boundary
    #[inline]
    pub fn source_of(&self, frame: FrameId) -> usize {
        self.frame_sources[frame.index()]
    }

    /// Frames contributing to at least one instance, in input order
    pub fn contributing_frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.frame_instances
            .iter()
            .enumerate()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(i, _)| FrameId(i))
    }

    fn new_instance(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId(self.instances.len());
        self.instances.push(instance);
        self.instance_frames.push(Vec::new());
        id
    }

    fn link(&mut self, frame: FrameId, instance: InstanceId) {
        self.frame_instances[frame.index()].push(instance);
        self.instance_frames[instance.index()].push(frame);
        self.instances[instance.index()].num_frames += 1;
    }
}

/// Builds the [`InstanceMap`] from an ordered frame list and an activity mask.
///
/// Precondition for windowing: timestamps are non-decreasing within every
/// contiguous run of equally named frames. Violations are not repaired.
#[derive(Debug, Clone, Default)]
pub struct InstanceMapper {
    windowing: Option<Windowing>,
}

impl InstanceMapper {
    pub fn new(windowing: Option<Windowing>) -> Self {
        Self { windowing }
    }

    pub fn map(&self, frames: &[Frame], active: &[bool]) -> Result<InstanceMap> {
        if frames.len() != active.len() {
            return Err(Error::InvalidDimension {
                expected: frames.len(),
                actual: active.len(),
            });
        }

        let mut map = InstanceMap {
            instances: Vec::new(),
            frame_instances: vec![SmallVec::new(); frames.len()],
            instance_frames: Vec::new(),
            frame_sources: Vec::with_capacity(frames.len()),
        };
        let runs = name_runs(frames);
        for (source, run) in runs.iter().enumerate() {
            map.frame_sources
                .extend(std::iter::repeat(source).take(run.len()));
        }

        match &self.windowing {
            None => map_by_name(frames, active, &mut map),
            Some(windowing) => {
                windowing.validate()?;
                for run in &runs {
                    map_windows(frames, active, run.clone(), windowing, &mut map)?;
                }
            }
        }

        debug!(
            "Mapped {} frames onto {} instances",
            frames.len(),
            map.num_instances()
        );
        Ok(map)
    }
}

/// Contiguous ranges of frames sharing the same name
fn name_runs(frames: &[Frame]) -> Vec<std::ops::Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=frames.len() {
        if i == frames.len() || frames[i].name != frames[start].name {
            if i > start {
                runs.push(start..i);
            }
            start = i;
        }
    }
    runs
}

fn map_by_name(frames: &[Frame], active: &[bool], map: &mut InstanceMap) {
    // A name seen again after another name continues its earlier instance
    let mut by_name: AHashMap<&str, InstanceId> = AHashMap::new();
    for (i, frame) in frames.iter().enumerate() {
        let id = match by_name.get(frame.name.as_str()) {
            Some(&id) => id,
            None => {
                let id = map.new_instance(Instance {
                    name: frame.name.clone(),
                    center: None,
                    labels: frame.labels.clone(),
                    num_frames: 0,
                });
                by_name.insert(frame.name.as_str(), id);
                id
            }
        };
        if active[i] {
            map.link(FrameId(i), id);
        }
    }
}

struct Window {
    lower: f32,
    upper: f32,
    open: bool,
    id: InstanceId,
}

fn map_windows(
    frames: &[Frame],
    active: &[bool],
    run: std::ops::Range<usize>,
    windowing: &Windowing,
    map: &mut InstanceMap,
) -> Result<()> {
    let times = frames[run.clone()]
        .iter()
        .map(|f| {
            f.time.ok_or_else(|| {
                Error::config(format!("windowing requires a timestamp on every frame ('{}')", f.name))
            })
        })
        .collect::<Result<Vec<f32>>>()?;
    let max_time = times.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let half = windowing.size / 2.0;

    let mut windows = Vec::new();
    let mut k = 0usize;
    loop {
        let center = k as f32 * windowing.hop;
        if center >= max_time + EPSILON {
            break;
        }
        let nearest = run.start + nearest_frame(&times, center);
        let id = map.new_instance(Instance {
            name: frames[nearest].name.clone(),
            center: Some(center),
            labels: frames[nearest].labels.clone(),
            num_frames: 0,
        });
        windows.push(Window {
            lower: center - half,
            upper: center + half,
            open: active[nearest],
            id,
        });
        k += 1;
    }

    let mut first = 0usize;
    for (offset, &t) in times.iter().enumerate() {
        let frame = run.start + offset;
        if !active[frame] {
            continue;
        }
        while first < windows.len() && windows[first].upper + EPSILON < t {
            first += 1;
        }
        let mut w = first;
        while w < windows.len() && windows[w].lower - EPSILON <= t {
            if windows[w].open && t <= windows[w].upper + EPSILON {
                map.link(FrameId(frame), windows[w].id);
            }
            w += 1;
        }
    }
    Ok(())
}

/// Offset of the frame closest to `center` in a sorted, non-empty time list
fn nearest_frame(times: &[f32], center: f32) -> usize {
    let idx = times.partition_point(|&t| t < center);
    if idx == 0 {
        0
    } else if idx == times.len() {
        times.len() - 1
    } else if (times[idx] - center).abs() < (center - times[idx - 1]).abs() {
        idx
    } else {
        idx - 1
    }
}
