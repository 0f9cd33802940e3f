//! Bob tuning file format (TOML) and conversion to runtime configs.
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use bob_balance::{BalanceConfig, BalanceStrategy};
use bob_collision::{BrakeLever, ColliderGeometry};
use bob_controller::{GrabbedLever, GrabbedLevers, SeatedRider};
use bob_motor::LocomotionConfig;
use rapier3d::math::{Isometry, Vector};
use serde::Deserialize;

pub const SUPPORTED_VERSION: u32 = 1;

/// Frame length used to flag drag values that would flip velocity signs.
const REFERENCE_DT: f32 = 1.0 / 60.0;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse tuning: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid tuning: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Clone, Debug, Deserialize)]
pub struct BobTuning {
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub collider: ColliderSection,
    #[serde(default)]
    pub locomotion: LocomotionSection,
    #[serde(default)]
    pub balance: BalanceSection,
    #[serde(default)]
    pub rider: RiderSection,
    #[serde(default)]
    pub levers: LeverSection,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ColliderSection {
    pub radius: f32,
    pub height: f32,
    pub center: [f32; 3],
    pub skin_width: f32,
}

impl Default for ColliderSection {
    fn default() -> Self {
        let geometry = ColliderGeometry::default();
        Self {
            radius: geometry.radius,
            height: geometry.height,
            center: geometry.center.into(),
            skin_width: geometry.skin_width,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct LocomotionSection {
    pub gravity: [f32; 3],
    pub drag: f32,
    pub direction_change_speed: f32,
    pub lateral_friction: f32,
    pub brake_force_max: f32,
    pub steer_rate_max_deg: f32,
    pub steer_rate_base_deg: f32,
    pub steer_rate_speed_scale: f32,
}

impl Default for LocomotionSection {
    fn default() -> Self {
        let config = LocomotionConfig::default();
        Self {
            gravity: config.gravity.into(),
            drag: config.drag,
            direction_change_speed: config.direction_change_speed,
            lateral_friction: config.lateral_friction,
            brake_force_max: config.brake_force_max,
            steer_rate_max_deg: config.steer_rate_max_deg,
            steer_rate_base_deg: config.steer_rate_base_deg,
            steer_rate_speed_scale: config.steer_rate_speed_scale,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct BalanceSection {
    pub strategy: BalanceStrategy,
    pub support_radius: f32,
    pub align_speed_deg: f32,
    pub max_overturn_deg: f32,
    pub tip_speed_deg: f32,
    pub recovery_speed_deg: f32,
    pub mass_factor: f32,
    pub skid_gain: f32,
    pub slope_gain: f32,
    pub force_scale: f32,
}

impl Default for BalanceSection {
    fn default() -> Self {
        let config = BalanceConfig::default();
        Self {
            strategy: config.strategy,
            support_radius: config.support_radius,
            align_speed_deg: config.align_speed_deg,
            max_overturn_deg: config.max_overturn_deg,
            tip_speed_deg: config.tip_speed_deg,
            recovery_speed_deg: config.recovery_speed_deg,
            mass_factor: config.mass_factor,
            skid_gain: config.skid_gain,
            slope_gain: config.slope_gain,
            force_scale: config.force_scale,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct RiderSection {
    pub head_offset: [f32; 3],
    pub com_weight: f32,
}

impl Default for RiderSection {
    fn default() -> Self {
        let rider = SeatedRider::default();
        Self {
            head_offset: rider.head_offset.into(),
            com_weight: rider.com_weight,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct LeverSection {
    pub length: f32,
    /// Hinge positions in the body frame.
    pub left_pivot: [f32; 3],
    pub right_pivot: [f32; 3],
    pub min_angle_deg: f32,
    pub max_angle_deg: f32,
}

impl Default for LeverSection {
    fn default() -> Self {
        Self {
            length: 0.5,
            left_pivot: [-0.3, 0.0, 0.4],
            right_pivot: [0.3, 0.0, 0.4],
            min_angle_deg: 0.0,
            max_angle_deg: 90.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TuningValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TuningValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runtime configs ready to hand to the controller builder.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeTuning {
    pub collider: ColliderGeometry,
    pub locomotion: LocomotionConfig,
    pub balance: BalanceConfig,
    pub rider: SeatedRider,
    pub levers: [BrakeLever; 2],
    pub grabbed: GrabbedLevers,
}

impl Default for BobTuning {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            name: None,
            collider: ColliderSection::default(),
            locomotion: LocomotionSection::default(),
            balance: BalanceSection::default(),
            rider: RiderSection::default(),
            levers: LeverSection::default(),
        }
    }
}

impl BobTuning {
    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads, parses and validates a tuning file. Warnings are logged.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tuning = Self::parse_toml(&text)?;
        let validation = tuning.validate();
        for warning in &validation.warnings {
            tracing::warn!(path = %path.display(), "{}", warning);
        }
        if !validation.is_ok() {
            return Err(ConfigError::Invalid(validation.errors));
        }
        tracing::debug!(path = %path.display(), name = ?tuning.name, "tuning loaded");
        Ok(tuning)
    }

    pub fn validate(&self) -> TuningValidation {
        let mut validation = TuningValidation::default();
        if self.version != SUPPORTED_VERSION {
            validation
                .errors
                .push(format!("unsupported version {}", self.version));
        }

        let collider = &self.collider;
        if !collider.radius.is_finite() || collider.radius <= 0.0 {
            validation
                .errors
                .push("collider radius must be > 0".to_string());
        }
        require_non_negative(&mut validation, "collider height", collider.height);
        require_non_negative(&mut validation, "collider skin_width", collider.skin_width);
        require_finite_vector(&mut validation, "collider center", collider.center);
        if collider.height.is_finite() && collider.height < 2.0 * collider.radius {
            validation.warnings.push(
                "collider height is below its diameter; the body is a sphere".to_string(),
            );
        }

        let locomotion = &self.locomotion;
        require_finite_vector(&mut validation, "locomotion gravity", locomotion.gravity);
        for (name, value) in [
            ("locomotion drag", locomotion.drag),
            ("locomotion direction_change_speed", locomotion.direction_change_speed),
            ("locomotion lateral_friction", locomotion.lateral_friction),
            ("locomotion brake_force_max", locomotion.brake_force_max),
            ("locomotion steer_rate_max_deg", locomotion.steer_rate_max_deg),
            ("locomotion steer_rate_base_deg", locomotion.steer_rate_base_deg),
            ("locomotion steer_rate_speed_scale", locomotion.steer_rate_speed_scale),
        ] {
            require_non_negative(&mut validation, name, value);
        }
        if locomotion.drag * REFERENCE_DT >= 1.0 {
            validation.warnings.push(format!(
                "drag {} flips velocity signs at 60 Hz",
                locomotion.drag
            ));
        }

        let balance = &self.balance;
        for (name, value) in [
            ("balance support_radius", balance.support_radius),
            ("balance align_speed_deg", balance.align_speed_deg),
            ("balance max_overturn_deg", balance.max_overturn_deg),
            ("balance tip_speed_deg", balance.tip_speed_deg),
            ("balance recovery_speed_deg", balance.recovery_speed_deg),
            ("balance mass_factor", balance.mass_factor),
            ("balance skid_gain", balance.skid_gain),
            ("balance slope_gain", balance.slope_gain),
            ("balance force_scale", balance.force_scale),
        ] {
            require_non_negative(&mut validation, name, value);
        }
        if balance.max_overturn_deg > 90.0 {
            validation
                .errors
                .push("balance max_overturn_deg must be <= 90".to_string());
        }
        if balance.recovery_speed_deg == 0.0 {
            validation
                .warnings
                .push("balance recovery_speed_deg is 0; overturn never recovers".to_string());
        }

        require_finite_vector(&mut validation, "rider head_offset", self.rider.head_offset);
        require_non_negative(&mut validation, "rider com_weight", self.rider.com_weight);

        let levers = &self.levers;
        require_non_negative(&mut validation, "levers length", levers.length);
        if levers.length == 0.0 {
            validation
                .warnings
                .push("levers length is 0; lever brakes never engage".to_string());
        }
        require_finite_vector(&mut validation, "levers left_pivot", levers.left_pivot);
        require_finite_vector(&mut validation, "levers right_pivot", levers.right_pivot);
        if !levers.min_angle_deg.is_finite()
            || !levers.max_angle_deg.is_finite()
            || levers.max_angle_deg <= levers.min_angle_deg
        {
            validation
                .errors
                .push("levers max_angle_deg must be > min_angle_deg".to_string());
        }
        validation
    }

    /// Validates and converts into runtime configs.
    pub fn runtime(&self) -> Result<RuntimeTuning, ConfigError> {
        let validation = self.validate();
        if !validation.is_ok() {
            return Err(ConfigError::Invalid(validation.errors));
        }
        let levers = &self.levers;
        let lever_at = |pivot: [f32; 3]| {
            BrakeLever::new(Isometry::translation(pivot[0], pivot[1], pivot[2]), levers.length)
        };
        let grabbed = GrabbedLever::new(levers.min_angle_deg, levers.max_angle_deg);
        Ok(RuntimeTuning {
            collider: ColliderGeometry {
                radius: self.collider.radius,
                height: self.collider.height,
                center: Vector::from(self.collider.center),
                skin_width: self.collider.skin_width,
            },
            locomotion: LocomotionConfig {
                gravity: Vector::from(self.locomotion.gravity),
                drag: self.locomotion.drag,
                direction_change_speed: self.locomotion.direction_change_speed,
                lateral_friction: self.locomotion.lateral_friction,
                brake_force_max: self.locomotion.brake_force_max,
                steer_rate_max_deg: self.locomotion.steer_rate_max_deg,
                steer_rate_base_deg: self.locomotion.steer_rate_base_deg,
                steer_rate_speed_scale: self.locomotion.steer_rate_speed_scale,
            },
            balance: BalanceConfig {
                strategy: self.balance.strategy,
                support_radius: self.balance.support_radius,
                align_speed_deg: self.balance.align_speed_deg,
                max_overturn_deg: self.balance.max_overturn_deg,
                tip_speed_deg: self.balance.tip_speed_deg,
                recovery_speed_deg: self.balance.recovery_speed_deg,
                mass_factor: self.balance.mass_factor,
                skid_gain: self.balance.skid_gain,
                slope_gain: self.balance.slope_gain,
                force_scale: self.balance.force_scale,
            },
            rider: SeatedRider {
                head_offset: Vector::from(self.rider.head_offset),
                lean: 0.0,
                com_weight: self.rider.com_weight,
            },
            levers: [lever_at(levers.left_pivot), lever_at(levers.right_pivot)],
            grabbed: GrabbedLevers::new(grabbed, grabbed),
        })
    }
}

fn require_non_negative(validation: &mut TuningValidation, name: &str, value: f32) {
    if !value.is_finite() || value < 0.0 {
        validation.errors.push(format!("{} must be >= 0", name));
    }
}

fn require_finite_vector(validation: &mut TuningValidation, name: &str, value: [f32; 3]) {
    if !value.iter().all(|v| v.is_finite()) {
        validation.errors.push(format!("{} must be finite", name));
    }
}
