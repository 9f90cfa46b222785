//! Scenes fed live by a running solver

use super::{draw_field, Scene, SceneError, Surface};
use crate::lib::lattice::{LatticeField, Vec3};
use crate::lib::settings::{NetworkSettings, StreamlineSettings, VelocityLayout};
use latticeview_network::protocol::{
    decode_f32s, decode_vec3s, decode_vec4s, decode_vec4s_xyz, VEC4_STRIDE,
};
use latticeview_network::{
    Channel, ChannelConfig, ConnectOutcome, Decoder, PayloadUnit, PollOutcome,
};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Reconnect pacing for the combined stream when none is configured
pub const COMBINED_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// A channel plus its reconnect pacing
struct Link<T> {
    channel: Channel<T, LatticeField>,
    reconnect_interval: f32,
    since_attempt: f32,
}

impl<T> Link<T> {
    fn new(channel: Channel<T, LatticeField>, reconnect_interval: Duration) -> Self {
        let reconnect_interval = reconnect_interval.as_secs_f32();
        Self {
            channel,
            reconnect_interval,
            // First attempt happens on the first tick
            since_attempt: reconnect_interval,
        }
    }

    /// Poll when connected, otherwise try to connect when the interval allows
    fn tick(&mut self, dt: f32, field: &mut LatticeField) -> Option<PollOutcome> {
        if self.channel.is_connected() {
            let outcome = self.channel.poll(field);
            trace!("Channel '{}': {:?}", self.channel.name(), outcome);
            return Some(outcome);
        }

        self.since_attempt += dt;
        if self.since_attempt >= self.reconnect_interval {
            if let ConnectOutcome::Connected(dims) = self.connect() {
                debug!("Channel '{}' (re)connected, grid {}", self.channel.name(), dims);
            }
        }
        None
    }

    fn connect(&mut self) -> ConnectOutcome {
        self.since_attempt = 0.0;
        self.channel.connect()
    }

    fn status(&self) -> String {
        format!(
            "{}: {:?}, {} frames",
            self.channel.name(),
            self.channel.state(),
            self.channel.stats().frames_applied
        )
    }

    fn close(&mut self) {
        if self.channel.is_connected() {
            self.channel.close();
        }
    }
}

fn velocity_channel(
    config: ChannelConfig,
    layout: VelocityLayout,
) -> Channel<[f32; 3], LatticeField> {
    let decode: Decoder<[f32; 3]> = match layout {
        VelocityLayout::Vec3 => decode_vec3s,
        VelocityLayout::Vec4 => decode_vec4s_xyz,
    };
    Channel::new("velocity", config, decode, |field: &mut LatticeField, data, dims| {
        let velocities = data.iter().map(|v| Vec3::new(v[0], v[1], v[2])).collect();
        Ok(field.set_macro_velocity(velocities, dims)?)
    })
}

fn density_channel(config: ChannelConfig) -> Channel<f32, LatticeField> {
    Channel::new("density", config, decode_f32s, |field: &mut LatticeField, data, dims| {
        Ok(field.set_density(data, dims)?)
    })
}

fn combined_channel(config: ChannelConfig) -> Channel<[f32; 4], LatticeField> {
    Channel::new("combined", config, decode_vec4s, |field: &mut LatticeField, data, dims| {
        Ok(field.set_combined(&data, dims)?)
    })
}

/// Live scene with separate velocity and density ports
pub struct NetworkedScene {
    settings: NetworkSettings,
    streamlines: StreamlineSettings,
    field: LatticeField,
    velocity: Option<Link<[f32; 3]>>,
    density: Option<Link<f32>>,
}

impl NetworkedScene {
    pub fn new(settings: NetworkSettings, streamlines: StreamlineSettings) -> Self {
        Self {
            settings,
            streamlines,
            field: LatticeField::new(),
            velocity: None,
            density: None,
        }
    }

    /// Whether both channels have completed a handshake
    pub fn is_connected(&self) -> bool {
        let connected = |c: Option<bool>| c.unwrap_or(false);
        connected(self.velocity.as_ref().map(|l| l.channel.is_connected()))
            && connected(self.density.as_ref().map(|l| l.channel.is_connected()))
    }
}

impl Scene for NetworkedScene {
    fn name(&self) -> &str {
        "Networked Simulation"
    }

    fn init(&mut self) -> Result<(), SceneError> {
        info!("Starting network data channels");
        let interval = self.settings.reconnect_interval();

        let velocity_config = self
            .settings
            .channel_config(self.settings.velocity_port, PayloadUnit::Bytes);
        let mut velocity = Link::new(
            velocity_channel(velocity_config, self.settings.velocity_layout),
            interval,
        );
        velocity.connect();

        let density_config = self
            .settings
            .channel_config(self.settings.density_port, PayloadUnit::Bytes);
        let mut density = Link::new(density_channel(density_config), interval);
        density.connect();

        self.velocity = Some(velocity);
        self.density = Some(density);
        Ok(())
    }

    fn update(&mut self, dt: f32) -> Result<(), SceneError> {
        let (Some(velocity), Some(density)) = (self.velocity.as_mut(), self.density.as_mut())
        else {
            return Err(SceneError::NotInitialized);
        };
        velocity.tick(dt, &mut self.field);
        density.tick(dt, &mut self.field);
        Ok(())
    }

    fn draw(&self, surface: &mut dyn Surface) {
        let status = [
            self.velocity.as_ref().map(Link::status),
            self.density.as_ref().map(Link::status),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("; ");
        draw_field(self.name(), status, &self.field, &self.streamlines, surface);
    }

    fn close(&mut self) {
        for link in self.velocity.iter_mut() {
            link.close();
        }
        for link in self.density.iter_mut() {
            link.close();
        }
    }

    fn field(&self) -> &LatticeField {
        &self.field
    }
}

/// Live scene with one Vec4 port carrying velocity and density together
pub struct CombinedScene {
    settings: NetworkSettings,
    streamlines: StreamlineSettings,
    field: LatticeField,
    link: Option<Link<[f32; 4]>>,
}

impl CombinedScene {
    pub fn new(settings: NetworkSettings, streamlines: StreamlineSettings) -> Self {
        Self {
            settings,
            streamlines,
            field: LatticeField::new(),
            link: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.channel.is_connected())
    }
}

impl Scene for CombinedScene {
    fn name(&self) -> &str {
        "Combined Simulation"
    }

    fn init(&mut self) -> Result<(), SceneError> {
        let unit = PayloadUnit::Elements {
            stride: VEC4_STRIDE,
        };
        let config = self.settings.channel_config(self.settings.combined_port, unit);
        let interval = match self.settings.reconnect_interval() {
            interval if interval.is_zero() => COMBINED_RECONNECT_INTERVAL,
            interval => interval,
        };
        let mut link = Link::new(combined_channel(config), interval);
        link.connect();
        self.link = Some(link);
        Ok(())
    }

    fn update(&mut self, dt: f32) -> Result<(), SceneError> {
        let link = self.link.as_mut().ok_or(SceneError::NotInitialized)?;
        link.tick(dt, &mut self.field);
        Ok(())
    }

    fn draw(&self, surface: &mut dyn Surface) {
        let status = self.link.as_ref().map(Link::status).unwrap_or_default();
        draw_field(self.name(), status, &self.field, &self.streamlines, surface);
    }

    fn close(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.close();
        }
    }

    fn field(&self) -> &LatticeField {
        &self.field
    }
}
