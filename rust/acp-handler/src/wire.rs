use crate::error::HandlerError;
use acp_auth::{BearerMsg, DirectMsg, PolicyCmdMsg, SignedMsg};
use acp_policy::PolicyCmd;
use serde::Deserialize;
use serde_json::Value;

/// Message shape before the embedded command is decoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireMsg {
    Direct {
        policy_id: String,
        cmd: Value,
    },
    Bearer {
        bearer_token: String,
        policy_id: String,
        cmd: Value,
    },
    Signed {
        payload: String,
    },
}

/// Decode a JSON command message.
///
/// The command is decoded separately so that an unknown command tag fails
/// as [`acp_policy::CmdDecodeError::UnknownVariant`] rather than as a
/// generic syntax error.
pub fn decode_msg(bytes: &[u8]) -> Result<PolicyCmdMsg, HandlerError> {
    let msg = match serde_json::from_slice(bytes).map_err(HandlerError::Message)? {
        WireMsg::Direct { policy_id, cmd } => PolicyCmdMsg::Direct(DirectMsg {
            policy_id,
            cmd: PolicyCmd::from_json(cmd)?,
        }),
        WireMsg::Bearer {
            bearer_token,
            policy_id,
            cmd,
        } => PolicyCmdMsg::Bearer(BearerMsg {
            bearer_token,
            policy_id,
            cmd: PolicyCmd::from_json(cmd)?,
        }),
        WireMsg::Signed { payload } => PolicyCmdMsg::Signed(SignedMsg { payload }),
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_common::{Classify, ErrorKind};
    use acp_policy::{CmdDecodeError, Object, RegisterObjectCmd};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_decodes_what_a_message_serializes_to() -> TestResult {
        let msg = PolicyCmdMsg::Bearer(BearerMsg {
            bearer_token: "a.b.c".into(),
            policy_id: "policy-1".into(),
            cmd: PolicyCmd::RegisterObject(RegisterObjectCmd {
                object: Object::new("file", "readme"),
            }),
        });
        assert_eq!(decode_msg(&serde_json::to_vec(&msg)?)?, msg);
        Ok(())
    }

    #[test]
    fn it_names_unknown_commands() {
        let error = decode_msg(
            br#"{"direct": {"policy_id": "policy-1", "cmd": {"transfer_object": {}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            error,
            HandlerError::Cmd(CmdDecodeError::UnknownVariant(ref tag)) if tag == "transfer_object"
        ));
        assert_eq!(error.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn it_rejects_unknown_strategies() {
        let error = decode_msg(br#"{"delegated": {"payload": "x"}}"#).unwrap_err();
        assert!(matches!(error, HandlerError::Message(_)));
    }
}
