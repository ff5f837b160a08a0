// src/command.rs - Commands handed from the ingest session to the dispatch loop

/// Six-degree-of-freedom movement request.
///
/// Values are normalised to [-1.0, 1.0] when decoded from a `"norm"` message.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementCommand {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl MovementCommand {
    pub fn new(x: f32, y: f32, z: f32, roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { x, y, z, roll, pitch, yaw }
    }

    pub fn from_array(v: [f32; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }

    /// Axis values in wire order: x, y, z, roll, pitch, yaw.
    pub fn to_array(&self) -> [f32; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn rotation(&self) -> [f32; 3] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// Request to engage or disengage the effector hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationCommand {
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Movement(MovementCommand),
    Activation(ActivationCommand),
}

impl From<MovementCommand> for Command {
    fn from(cmd: MovementCommand) -> Self {
        Command::Movement(cmd)
    }
}

impl From<ActivationCommand> for Command {
    fn from(cmd: ActivationCommand) -> Self {
        Command::Activation(cmd)
    }
}
