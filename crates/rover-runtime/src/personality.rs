//! [`TraitEvolution`] – slow drift of the rover's personality.
//!
//! Life events nudge individual traits by small fixed steps; battery
//! readings pull `energy` toward the charge level with an exponential moving
//! average.  Every mutation clamps back into `[0, 1]`.

use rover_types::PersonalityTraits;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Smoothing factor for the energy moving average.
const ENERGY_ALPHA: f32 = 0.2;

/// Something that happened to the rover worth remembering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LifeEvent {
    HumanInteraction,
    ObstacleEncounter,
    Discovery,
    Success,
    Failure,
    /// New battery reading, in percent.
    BatteryChanged(f32),
}

#[derive(Debug, Clone, Default)]
pub struct TraitEvolution {
    traits: PersonalityTraits,
}

impl TraitEvolution {
    pub fn new(traits: PersonalityTraits) -> Self {
        let mut traits = traits;
        traits.clamp();
        Self { traits }
    }

    pub fn traits(&self) -> &PersonalityTraits {
        &self.traits
    }

    pub fn apply(&mut self, event: LifeEvent) {
        let t = &mut self.traits;
        match event {
            LifeEvent::HumanInteraction => {
                t.sociability += 0.02;
                t.playfulness += 0.01;
            }
            LifeEvent::ObstacleEncounter => {
                t.confidence -= 0.01;
            }
            LifeEvent::Discovery => {
                t.curiosity += 0.02;
                t.playfulness += 0.005;
            }
            LifeEvent::Success => {
                t.confidence += 0.03;
            }
            LifeEvent::Failure => {
                t.confidence -= 0.02;
                t.curiosity -= 0.005;
            }
            LifeEvent::BatteryChanged(percent) => {
                let charge = (percent / 100.0).clamp(0.0, 1.0);
                t.energy += ENERGY_ALPHA * (charge - t.energy);
            }
        }
        t.clamp();
        trace!(?event, traits = ?self.traits, "traits updated");
    }

    /// Back to the stock personality.
    pub fn reset(&mut self) {
        self.traits = PersonalityTraits::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_nudge_the_right_traits() {
        let mut evolution = TraitEvolution::default();
        let before = *evolution.traits();

        evolution.apply(LifeEvent::HumanInteraction);
        evolution.apply(LifeEvent::Success);
        evolution.apply(LifeEvent::Discovery);

        let after = evolution.traits();
        assert!(after.sociability > before.sociability);
        assert!(after.confidence > before.confidence);
        assert!(after.curiosity > before.curiosity);
    }

    #[test]
    fn traits_stay_in_unit_range() {
        let mut evolution = TraitEvolution::default();
        for _ in 0..500 {
            evolution.apply(LifeEvent::Failure);
            evolution.apply(LifeEvent::ObstacleEncounter);
            evolution.apply(LifeEvent::HumanInteraction);
        }
        let t = evolution.traits();
        assert_eq!(t.confidence, 0.0);
        assert_eq!(t.sociability, 1.0);
        assert!((0.0..=1.0).contains(&t.curiosity));
    }

    #[test]
    fn energy_tracks_battery() {
        let mut evolution = TraitEvolution::default();
        for _ in 0..100 {
            evolution.apply(LifeEvent::BatteryChanged(10.0));
        }
        assert!((evolution.traits().energy - 0.1).abs() < 1e-3);
    }

    #[test]
    fn construction_clamps_and_reset_restores_defaults() {
        let mut evolution = TraitEvolution::new(PersonalityTraits {
            curiosity: 3.0,
            ..PersonalityTraits::default()
        });
        assert_eq!(evolution.traits().curiosity, 1.0);
        evolution.reset();
        assert_eq!(*evolution.traits(), PersonalityTraits::default());
    }
}
