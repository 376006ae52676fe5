use super::{
    par_rm_split,
    simulated::{SimulatedInterferometerBuilder, SimulatedPositioner},
    Actuate, Interferometer, Positioner,
};
use crate::{config, OttConfig, OttError, Result};

/// The optical test tower
///
/// A tower is built once at startup by [Tower::from_config]
pub struct Tower {
    pub parabola: Box<dyn Positioner>,
    pub reference_mirror: Box<dyn Positioner>,
    pub m4: Box<dyn Positioner>,
    pub interferometer: Box<dyn Interferometer>,
}
impl Tower {
    /// Builds the tower devices
    ///
    /// Only the simulated tower can be built, the real device transports are not part of this crate
    pub fn from_config(config: &OttConfig) -> Result<Self> {
        if config.tower.simulated {
            Self::simulated(config, Default::default())
        } else {
            Err(OttError::Device(
                "no transport available for the real tower devices".into(),
            ))
        }
    }
    /// Builds a simulated tower with a custom interferometer
    pub fn simulated(
        config: &OttConfig,
        interferometer: SimulatedInterferometerBuilder,
    ) -> Result<Self> {
        let n = config.tower.n_dof_per_group;
        let parabola = SimulatedPositioner::new(n);
        let reference_mirror = SimulatedPositioner::new(n);
        let interferometer = interferometer.build(&config.tower, &parabola, &reference_mirror)?;
        log::info!("simulated tower ready");
        Ok(Self {
            parabola: Box::new(parabola),
            reference_mirror: Box::new(reference_mirror),
            m4: Box::new(SimulatedPositioner::new(n)),
            interferometer: Box::new(interferometer),
        })
    }
    /// Returns the parabola and reference mirror [Actuate] adapter and the interferometer
    pub fn par_rm<'a>(
        &'a mut self,
        tower: &'a config::Tower,
    ) -> Result<(ParRmActuator<'a>, &'a mut dyn Interferometer)> {
        let actuator = ParRmActuator::new(&mut *self.parabola, &mut *self.reference_mirror, tower)?;
        Ok((actuator, &mut *self.interferometer))
    }
}

/// Parabola and reference mirror pair as an [Actuate] device
///
/// Commands are the parabola DOF followed by the reference mirror DOF
/// and they are applied relative to the positions at the creation of the adapter.
pub struct ParRmActuator<'a> {
    parabola: &'a mut dyn Positioner,
    reference_mirror: &'a mut dyn Positioner,
    tower: &'a config::Tower,
    parabola_start: Vec<f64>,
    reference_mirror_start: Vec<f64>,
}
impl<'a> ParRmActuator<'a> {
    pub fn new(
        parabola: &'a mut dyn Positioner,
        reference_mirror: &'a mut dyn Positioner,
        tower: &'a config::Tower,
    ) -> Result<Self> {
        let parabola_start = parabola.position()?;
        let reference_mirror_start = reference_mirror.position()?;
        Ok(Self {
            parabola,
            reference_mirror,
            tower,
            parabola_start,
            reference_mirror_start,
        })
    }
}
impl<'a> Actuate for ParRmActuator<'a> {
    fn n_actuator(&self) -> usize {
        self.tower.n_dof()
    }
    fn apply(&mut self, command: &[f64]) -> Result<()> {
        let (par, rm) = par_rm_split(self.tower, command)?;
        let add = |start: &[f64], delta: Vec<f64>| -> Vec<f64> {
            start.iter().zip(delta).map(|(s, d)| s + d).collect()
        };
        self.parabola
            .set_position(&add(&self.parabola_start, par))?;
        self.reference_mirror
            .set_position(&add(&self.reference_mirror_start, rm))
    }
}
