use anyhow::bail;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Role {
    #[default]
    Viewer,
    Editor,
    Admin,
}

/// What the caller may change. Passed into every mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_edit: bool,
    pub can_delete: bool,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Viewer => Capabilities::default(),
            Role::Editor => Capabilities {
                can_edit: true,
                can_delete: false,
            },
            Role::Admin => Capabilities {
                can_edit: true,
                can_delete: true,
            },
        }
    }

    pub fn require_edit(&self, action: &str) -> anyhow::Result<()> {
        if !self.can_edit {
            bail!("permission denied: {action} requires edit access");
        }
        Ok(())
    }

    pub fn require_delete(&self, action: &str) -> anyhow::Result<()> {
        if !self.can_delete {
            bail!("permission denied: {action} requires delete access");
        }
        Ok(())
    }
}
