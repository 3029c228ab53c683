//! Built-in schema for project submission records.
//!
//! | Version | Change                                                          |
//! |---------|-----------------------------------------------------------------|
//! | 1       | `slug`, `name`, `event`, `authors`, optional `description`,     |
//! |         | `loader_version`, `modrinth_id`                                 |
//! | 2       | drops `description` and `loader_version`                        |
//! | 3       | adds `registration_time` (ms since Unix epoch, default 0)       |
//! | 4       | adds `freeze_time` (ms since Unix epoch, default 0)             |
//! | 5       | adds `invites` (default empty)                                  |
//! | 6       | moves `modrinth_id` to `integrations.modrinth.project_id` and   |
//! |         | replaces `authors` with `roles`                                 |

use modgarden_types::{SchemaError, SchemaVersion};
use serde_json::{Value, json};

use crate::{
    chain::{ChainBuilder, MigrationChain, StepError},
    contract::{FieldKind, ShapeContract, ShapeContractBuilder, StringFormat},
    engine::MigrationEngine,
    ops,
    record::Fields,
    registry::CodecRegistry,
};

/// Current project record version.
pub const PROJECT_CURRENT_VERSION: SchemaVersion = SchemaVersion::new(6);

/// Role name given to authors carried over from version 5.
pub const MEMBER_ROLE_NAME: &str = "Member";

/// Project permission bits given to authors carried over from version 5.
pub const MEMBER_PERMISSIONS: u64 = 1;

const fn v(n: u32) -> SchemaVersion {
    SchemaVersion::new(n)
}

/// Fields shared by every version.
fn base() -> ShapeContractBuilder {
    ShapeContract::builder()
        .formatted("slug", StringFormat::Slug)
        .required("name", FieldKind::String)
        .formatted("event", StringFormat::Slug)
}

fn authors(builder: ShapeContractBuilder) -> ShapeContractBuilder {
    builder.required("authors", FieldKind::array_of(FieldKind::String))
}

fn timestamps(builder: ShapeContractBuilder, freeze: bool) -> ShapeContractBuilder {
    let builder = builder.defaulted("registration_time", FieldKind::Integer, json!(0));
    if freeze { builder.defaulted("freeze_time", FieldKind::Integer, json!(0)) } else { builder }
}

fn invites(builder: ShapeContractBuilder) -> Result<ShapeContractBuilder, SchemaError> {
    let invite = ShapeContract::builder()
        .required("code", FieldKind::String)
        .formatted("user_id", StringFormat::NaturalId)
        .required("expires", FieldKind::Integer)
        .required("role", FieldKind::String)
        .build()?;
    Ok(builder.defaulted("invites", FieldKind::array_of(FieldKind::record(invite)), json!([])))
}

fn v6_contract() -> Result<ShapeContract, SchemaError> {
    let role = ShapeContract::builder()
        .formatted("user_id", StringFormat::NaturalId)
        .required("role_name", FieldKind::String)
        .required("permissions", FieldKind::Integer)
        .build()?;
    let modrinth = ShapeContract::builder().required("project_id", FieldKind::String).build()?;
    let integrations = ShapeContract::builder()
        .optional("modrinth", FieldKind::record(modrinth))
        .allow_unknown_fields(true)
        .build()?;

    invites(timestamps(base(), true))?
        .required("roles", FieldKind::array_of(FieldKind::record(role)))
        .optional("integrations", FieldKind::record(integrations))
        .build()
}

/// Registers the contracts of versions 1 through 6.
///
/// # Errors
///
/// Only fails if a contract declaration is invalid.
pub fn project_registry() -> Result<CodecRegistry, SchemaError> {
    let v1 = authors(base())
        .optional("description", FieldKind::String)
        .optional("loader_version", FieldKind::String)
        .optional("modrinth_id", FieldKind::String)
        .build()?;
    let v2 = authors(base()).optional("modrinth_id", FieldKind::String).build()?;
    let v3 = timestamps(authors(base()), false).optional("modrinth_id", FieldKind::String).build()?;
    let v4 = timestamps(authors(base()), true).optional("modrinth_id", FieldKind::String).build()?;
    let v5 = invites(timestamps(authors(base()), true))?
        .optional("modrinth_id", FieldKind::String)
        .build()?;

    let mut registry = CodecRegistry::builder();
    registry
        .register(v(1), v1)?
        .register(v(2), v2)?
        .register(v(3), v3)?
        .register(v(4), v4)?
        .register(v(5), v5)?
        .register(v(6), v6_contract()?)?;
    registry.build()
}

fn v1_to_v2(mut fields: Fields) -> Result<Fields, StepError> {
    ops::drop_field(&mut fields, "description");
    ops::drop_field(&mut fields, "loader_version");
    Ok(fields)
}

fn v2_to_v3(mut fields: Fields) -> Result<Fields, StepError> {
    ops::add_field(&mut fields, "registration_time", json!(0));
    Ok(fields)
}

fn v3_to_v4(mut fields: Fields) -> Result<Fields, StepError> {
    ops::add_field(&mut fields, "freeze_time", json!(0));
    Ok(fields)
}

fn v4_to_v5(mut fields: Fields) -> Result<Fields, StepError> {
    ops::add_field(&mut fields, "invites", json!([]));
    Ok(fields)
}

fn v5_to_v6(mut fields: Fields) -> Result<Fields, StepError> {
    ops::nest_field(&mut fields, "modrinth_id", &["integrations", "modrinth", "project_id"])?;
    ops::rename_field(&mut fields, "authors", "roles")?;
    ops::map_elements(&mut fields, "roles", |index, author| match author {
        Value::String(user_id) => Ok(json!({
            "user_id": user_id,
            "role_name": MEMBER_ROLE_NAME,
            "permissions": MEMBER_PERMISSIONS,
        })),
        _ => Err(StepError::field(format!("authors[{index}]"), "expected string")),
    })?;
    Ok(fields)
}

/// Registers the steps from version 1 up to [`PROJECT_CURRENT_VERSION`].
///
/// # Errors
///
/// Only fails if a step is registered twice.
pub fn project_steps() -> Result<ChainBuilder, SchemaError> {
    let mut steps = MigrationChain::builder();
    steps
        .step(v(1), "drop description and loader_version", v1_to_v2)?
        .step(v(2), "add registration_time", v2_to_v3)?
        .step(v(3), "add freeze_time", v3_to_v4)?
        .step(v(4), "add invites", v4_to_v5)?
        .step(v(5), "nest modrinth_id, authors to roles", v5_to_v6)?;
    Ok(steps)
}

/// Assembles the engine for project records.
///
/// # Errors
///
/// Only fails if the built-in declarations are inconsistent.
pub fn project_engine() -> Result<MigrationEngine, SchemaError> {
    MigrationEngine::new(project_registry()?, project_steps()?)
}
