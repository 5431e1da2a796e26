// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use bytemuck::{Pod, Zeroable};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::kernels::domain_max;
use crate::mask::Mask;
use crate::settings::PlacementPolicy;

/// Phase spread between consecutive agents.
pub const PHASE_STEP: f32 = 0.5;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Agent {
    pub position: [f32; 2], // field pixels, origin top-left
    pub heading: f32,       // radians
    pub scalar: f32,        // per-agent phase
}

const _: [(); 16] = [(); std::mem::size_of::<Agent>()];

impl Agent {
    pub fn new(x: f32, y: f32, heading: f32, scalar: f32) -> Self {
        Self {
            position: [x, y],
            heading,
            scalar,
        }
    }
}

/// Fixed-size agent population. Length never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStore {
    agents: Box<[Agent]>,
}

impl AgentStore {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: agents.into_boxed_slice(),
        }
    }

    /// Decode packed agent records, e.g. a device readback. `bytes` may be unaligned.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(bytemuck::pod_collect_to_vec(bytes))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.agents
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.agents)
    }
}

/// Build the initial population.
pub fn generate_initial_agents<R: Rng + ?Sized>(
    count: u32,
    placement: &PlacementPolicy,
    mask: Option<&Mask>,
    width: u32,
    height: u32,
    mask_threshold: u8,
    rng: &mut R,
) -> Result<AgentStore, SetupError> {
    let w = width as f32;
    let h = height as f32;

    let candidates = match placement {
        PlacementPolicy::Mask => {
            let mask = mask.ok_or(SetupError::MissingMask)?;
            let pixels = mask.selected_pixels(mask_threshold);
            if pixels.is_empty() {
                return Err(SetupError::EmptyMaskSelection {
                    threshold: mask_threshold,
                });
            }
            // Mask pixels map onto the field by relative position.
            let sx = w / mask.width() as f32;
            let sy = h / mask.height() as f32;
            Some((pixels, sx, sy))
        }
        _ => None,
    };

    let mut agents = Vec::with_capacity(count as usize);
    for index in 0..count {
        let [x, y] = match (placement, &candidates) {
            (PlacementPolicy::Disk { radius }, _) => {
                let max_r = 0.5 * w.min(h) * radius;
                // sqrt keeps the density uniform over the area.
                let r = max_r * rng.gen::<f32>().sqrt();
                let theta = rng.gen_range(0.0..std::f32::consts::TAU);
                [0.5 * w + r * theta.cos(), 0.5 * h + r * theta.sin()]
            }
            (PlacementPolicy::Mask, Some((pixels, sx, sy))) => {
                let (px, py) = pixels[rng.gen_range(0..pixels.len())];
                [
                    (px as f32 + rng.gen::<f32>()) * sx,
                    (py as f32 + rng.gen::<f32>()) * sy,
                ]
            }
            _ => [rng.gen_range(0.0..w), rng.gen_range(0.0..h)],
        };
        let heading = rng.gen_range(0.0..std::f32::consts::TAU);
        agents.push(Agent::new(
            x.clamp(0.0, domain_max(w)),
            y.clamp(0.0, domain_max(h)),
            heading,
            index as f32 * PHASE_STEP,
        ));
    }

    log::debug!("Placed {} agents ({:?})", agents.len(), placement);
    Ok(AgentStore::new(agents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn records_decode_from_unaligned_bytes() {
        let agents = vec![Agent::new(1.0, 2.0, 0.5, 3.0), Agent::new(4.0, 5.0, 1.5, 6.0)];
        let store = AgentStore::new(agents);
        // Shift by one byte so the payload cannot be 4-byte aligned.
        let mut raw = vec![0u8];
        raw.extend_from_slice(store.as_bytes());
        assert_eq!(AgentStore::from_bytes(&raw[1..]), store);
    }

    #[test]
    fn disk_placement_stays_inside_the_disk() {
        let mut rng = StdRng::seed_from_u64(3);
        let store = generate_initial_agents(
            2_000,
            &PlacementPolicy::Disk { radius: 0.5 },
            None,
            200,
            100,
            128,
            &mut rng,
        )
        .unwrap();
        assert_eq!(store.len(), 2_000);
        for agent in store.as_slice() {
            let dx = agent.position[0] - 100.0;
            let dy = agent.position[1] - 50.0;
            assert!((dx * dx + dy * dy).sqrt() <= 25.0 + 1e-3);
        }
    }

    #[test]
    fn scatter_placement_covers_field_domain() {
        let mut rng = StdRng::seed_from_u64(11);
        let store =
            generate_initial_agents(500, &PlacementPolicy::Scatter, None, 64, 32, 128, &mut rng)
                .unwrap();
        for agent in store.as_slice() {
            assert!((0.0..64.0).contains(&agent.position[0]));
            assert!((0.0..32.0).contains(&agent.position[1]));
        }
    }

    #[test]
    fn phase_scalar_follows_index() {
        let mut rng = StdRng::seed_from_u64(0);
        let store =
            generate_initial_agents(4, &PlacementPolicy::Scatter, None, 8, 8, 128, &mut rng)
                .unwrap();
        let phases: Vec<f32> = store.as_slice().iter().map(|a| a.scalar).collect();
        assert_eq!(phases, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn mask_placement_uses_selected_pixels_only() {
        let mut pixels = vec![0u8; 16];
        pixels[1 * 4 + 2] = 222;
        let mask = Mask::from_raw(4, 4, pixels);
        let mut rng = StdRng::seed_from_u64(5);
        let store = generate_initial_agents(
            100,
            &PlacementPolicy::Mask,
            Some(&mask),
            8,
            8,
            128,
            &mut rng,
        )
        .unwrap();
        for agent in store.as_slice() {
            // mask pixel (2, 1) covers field [4, 6) x [2, 4)
            assert!((4.0..6.0).contains(&agent.position[0]));
            assert!((2.0..4.0).contains(&agent.position[1]));
        }
    }

    #[test]
    fn empty_mask_selection_is_an_error() {
        let mask = Mask::from_raw(2, 2, vec![10, 20, 30, 40]);
        let mut rng = StdRng::seed_from_u64(5);
        let err = generate_initial_agents(
            10,
            &PlacementPolicy::Mask,
            Some(&mask),
            2,
            2,
            200,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::EmptyMaskSelection { threshold: 200 }));
    }

    #[test]
    fn mask_policy_without_mask_is_an_error() {
        let mut rng = StdRng::seed_from_u64(5);
        let err = generate_initial_agents(1, &PlacementPolicy::Mask, None, 2, 2, 1, &mut rng)
            .unwrap_err();
        assert!(matches!(err, SetupError::MissingMask));
    }

    #[test]
    fn agent_bytes_are_tightly_packed() {
        let store = AgentStore::new(vec![Agent::new(1.0, 2.0, 3.0, 4.0); 3]);
        assert_eq!(store.as_bytes().len(), 3 * 16);
        let floats: &[f32] = bytemuck::cast_slice(store.as_bytes());
        assert_eq!(&floats[..4], &[1.0, 2.0, 3.0, 4.0]);
    }
}
