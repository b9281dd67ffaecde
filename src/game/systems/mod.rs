pub mod kinematics;
pub mod spawning;
pub mod zones;
