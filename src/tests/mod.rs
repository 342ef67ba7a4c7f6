// Tests module
// Support: scripted decision sources shared by unit and scenario tests
// Integration: whole turns with scripted agents, whole runs with built-in strategies
// Governance invariants: property tests over every rule

pub mod support;
pub mod integration;
