//! # ecsynth-template
//!
//! Builds the deployment template for an ECS service behind an application
//! load balancer, with a privileged security-monitoring sidecar.
//!
//! Handles:
//! - **Builder**: [`StackBuilder`](builder::StackBuilder) owns every declared
//!   resource and hands back a [`Template`](template::Template).
//! - **Constructs**: typed declarations (VPC, cluster capacity, task
//!   definition, service, load balancer) that render template resources.
//! - **Graph**: resource dependency ordering and cycle detection.
//! - **Validator**: reference integrity checks over a finished template.
//! - **Assert**: comparing a template against a baseline or querying it.
//! - **Stack**: the concrete deployment assembled from a
//!   [`StackConfig`](ecsynth_common::config::StackConfig).

pub mod assert;
pub mod builder;
pub mod constructs;
pub mod graph;
pub mod intrinsic;
pub mod logical_id;
pub mod stack;
pub mod template;
pub mod validator;
