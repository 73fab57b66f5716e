//! Shape validation for inbound registration/heartbeat payloads, ahead of
//! any store access. Mirrors the gateway's own request-guard style: reject
//! early with a descriptive `RegistryError::Validation`, never panic.

use crate::error::RegistryError;
use crate::spec::{AgentMetadata, ToolMetadata};

pub fn validate_agent_id(agent_id: &str) -> Result<(), RegistryError> {
    if agent_id.trim().is_empty() {
        return Err(RegistryError::Validation("agent_id must not be empty".into()));
    }
    Ok(())
}

pub fn validate_metadata(metadata: &AgentMetadata) -> Result<(), RegistryError> {
    if metadata.agent_type.trim().is_empty() {
        return Err(RegistryError::Validation("metadata.agent_type is required".into()));
    }
    if let Some(port) = &metadata.http_port {
        if metadata.resolved_port().is_none() && !port.is_null() {
            return Err(RegistryError::Validation(
                "metadata.http_port must be a valid port number".into(),
            ));
        }
    }
    for tool in &metadata.tools {
        validate_tool(tool)?;
    }
    Ok(())
}

fn validate_tool(tool: &ToolMetadata) -> Result<(), RegistryError> {
    if tool.function_name.trim().is_empty() {
        return Err(RegistryError::Validation(
            "tool.function_name must not be empty".into(),
        ));
    }
    if tool.capability.trim().is_empty() {
        return Err(RegistryError::Validation(format!(
            "tool '{}' is missing a capability",
            tool.function_name
        )));
    }
    for position in &tool.dependencies {
        let specs = position.normalize();
        let alternatives = specs.alternatives();
        if alternatives.is_empty() {
            return Err(RegistryError::Validation(format!(
                "tool '{}' has a dependency position with no alternatives",
                tool.function_name
            )));
        }
        for spec in alternatives {
            if spec.capability.trim().is_empty() {
                return Err(RegistryError::Validation(format!(
                    "tool '{}' declares a dependency with an empty capability",
                    tool.function_name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RegisterRequest;

    fn parse(json: &str) -> RegisterRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn rejects_empty_agent_id() {
        assert!(validate_agent_id("").is_err());
        assert!(validate_agent_id("  ").is_err());
    }

    #[test]
    fn rejects_missing_agent_type() {
        let req = parse(r#"{"agent_id":"a1","metadata":{"agent_type":""}}"#);
        assert!(validate_metadata(&req.metadata).is_err());
    }

    #[test]
    fn rejects_tool_with_empty_capability() {
        let req = parse(
            r#"{"agent_id":"a1","metadata":{"agent_type":"mcp_agent","tools":[{"function_name":"f","capability":""}]}}"#,
        );
        assert!(validate_metadata(&req.metadata).is_err());
    }

    #[test]
    fn accepts_well_formed_metadata() {
        let req = parse(
            r#"{"agent_id":"a1","metadata":{"agent_type":"mcp_agent","tools":[{"function_name":"f","capability":"math"}]}}"#,
        );
        assert!(validate_metadata(&req.metadata).is_ok());
    }
}
