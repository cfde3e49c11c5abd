//! modref: module reference analysis for infrastructure configurations.
//!
//! Given a reference found in a module (`var.cidr`, `module.net.vpc_id`,
//! `aws_instance.web.ami`), finds the references made by the definition it
//! points at and the module they belong to. Provider schemas narrow resource
//! references down to the attribute or nested block they name.

pub mod cli;
pub mod core;
