// Docker integration module using Bollard
// Connects the lifecycle operations to the local Docker daemon

pub mod client;

pub use client::DockerClient;
