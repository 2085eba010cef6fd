//! Pass ordering for one advancing frame.
//!
//! ```text
//! RayInit -> rays[0]
//! Bounce(0): rays[0] -> rays[1], layer 0
//! Bounce(1): rays[1] -> rays[0], layer 1
//! ...
//! Accumulate: layers 0..n -> estimate
//! ```

use smallvec::SmallVec;

/// One of the two ray buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingPong {
    Zero,
    One,
}

impl PingPong {
    pub const ALL: [PingPong; 2] = [PingPong::Zero, PingPong::One];

    /// The complementary slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

/// A bounce shading pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BouncePass {
    /// Bounce index, also the layer written in the attenuation/emission arrays.
    pub index: u32,
    /// Ray slot written by the previous pass.
    pub read: PingPong,
    /// Ray slot receiving the outgoing rays.
    pub write: PingPong,
}

/// A single GPU pass of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    RayInit { write: PingPong },
    Bounce(BouncePass),
    Accumulate { layers: u32 },
}

impl Pass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RayInit { .. } => "ray_init",
            Self::Bounce(_) => "bounce",
            Self::Accumulate { .. } => "accumulate",
        }
    }
}

/// Ordered passes for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    passes: SmallVec<[Pass; 8]>,
}

impl FramePlan {
    /// Build the pass sequence for `bounces` bounces.
    pub fn new(bounces: u32) -> Self {
        let mut passes = SmallVec::with_capacity(bounces as usize + 2);
        let mut current = PingPong::Zero;
        passes.push(Pass::RayInit { write: current });
        for index in 0..bounces {
            let write = current.other();
            passes.push(Pass::Bounce(BouncePass { index, read: current, write }));
            current = write;
        }
        passes.push(Pass::Accumulate { layers: bounces });
        Self { passes }
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn bounces(&self) -> impl Iterator<Item = &BouncePass> + '_ {
        self.passes.iter().filter_map(|p| match p {
            Pass::Bounce(b) => Some(b),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_alternation() {
        let plan = FramePlan::new(4);
        let writes: Vec<usize> = plan.bounces().map(|b| b.write.index()).collect();
        assert_eq!(writes, vec![1, 0, 1, 0]);
        for b in plan.bounces() {
            assert_ne!(b.read, b.write);
        }
    }

    #[test]
    fn test_each_bounce_reads_previous_write() {
        let plan = FramePlan::new(5);
        let mut last_write = match plan.passes()[0] {
            Pass::RayInit { write } => write,
            other => panic!("first pass must be ray init, got {other:?}"),
        };
        assert_eq!(last_write, PingPong::Zero);
        for b in plan.bounces() {
            assert_eq!(b.read, last_write);
            last_write = b.write;
        }
    }

    #[test]
    fn test_plan_order_and_layers() {
        let plan = FramePlan::new(3);
        assert_eq!(plan.len(), 5);
        let labels: Vec<&str> = plan.passes().iter().map(Pass::label).collect();
        assert_eq!(labels, ["ray_init", "bounce", "bounce", "bounce", "accumulate"]);
        let layers: Vec<u32> = plan.bounces().map(|b| b.index).collect();
        assert_eq!(layers, vec![0, 1, 2]);
        assert_eq!(plan.passes()[4], Pass::Accumulate { layers: 3 });
    }

    #[test]
    fn test_zero_bounces() {
        let plan = FramePlan::new(0);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.bounces().count(), 0);
    }
}
