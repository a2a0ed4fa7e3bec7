//! The read-only arena geth's `callTracer` output is flattened from.

use alloy::primitives::{Address, U256};
pub use alloy::rpc::types::trace::geth::CallFrame;

use crate::{rosetta::OperationType, DecodeError};

/// Frame kinds reported by `callTracer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    SelfDestruct,
}

impl CallKind {
    pub fn parse(typ: &str) -> Option<Self> {
        Some(match typ {
            "CALL" => Self::Call,
            "CALLCODE" => Self::CallCode,
            "DELEGATECALL" => Self::DelegateCall,
            "STATICCALL" => Self::StaticCall,
            "CREATE" => Self::Create,
            "CREATE2" => Self::Create2,
            "SELFDESTRUCT" | "SUICIDE" => Self::SelfDestruct,
            _ => return None,
        })
    }

    /// The operation a frame of this kind is reported as, or `None` if it
    /// never moves value between accounts.
    ///
    /// `DELEGATECALL` repeats its caller's value without transferring it,
    /// `CALLCODE` transfers from the caller to itself, and `STATICCALL`
    /// can't carry value at all.
    pub const fn operation_type(self) -> Option<OperationType> {
        match self {
            Self::Call => Some(OperationType::Call),
            Self::Create => Some(OperationType::Create),
            Self::Create2 => Some(OperationType::Create2),
            Self::SelfDestruct => Some(OperationType::Destruct),
            Self::CallCode | Self::DelegateCall | Self::StaticCall => None,
        }
    }

    /// Creations and destructions are reported even when they move no value.
    pub const fn always_emitted(self) -> bool {
        matches!(self, Self::Create | Self::Create2 | Self::SelfDestruct)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceNode {
    pub kind: CallKind,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_used: u64,
    pub error: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// A transaction's call tree, stored as an arena of nodes.
///
/// Nodes are laid out in pre-order, so a parent always precedes its
/// descendants and `nodes()[0]` is the root frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallTrace {
    nodes: Vec<TraceNode>,
}

impl CallTrace {
    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    pub fn root(&self) -> &TraceNode {
        // never empty, see `TryFrom<CallFrame>`
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TryFrom<CallFrame> for CallTrace {
    type Error = DecodeError;

    fn try_from(root: CallFrame) -> Result<Self, Self::Error> {
        let mut nodes = Vec::new();
        let mut stack = vec![(root, None::<usize>)];

        while let Some((mut frame, parent)) = stack.pop() {
            let index = nodes.len();
            let kind = CallKind::parse(&frame.typ)
                .ok_or_else(|| DecodeError::UnknownFrameKind(frame.typ.clone()))?;
            let calls = std::mem::take(&mut frame.calls);
            nodes.push(TraceNode {
                kind,
                from: frame.from,
                to: frame.to,
                value: frame.value.unwrap_or_default(),
                gas_used: u64::try_from(frame.gas_used).unwrap_or(u64::MAX),
                error: frame.error,
                parent,
                children: Vec::with_capacity(calls.len()),
            });
            if let Some(parent) = parent {
                nodes[parent].children.push(index);
            }
            // reversed, so the first call is popped (and numbered) first
            stack.extend(calls.into_iter().rev().map(|it| (it, Some(index))));
        }

        Ok(Self { nodes })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame(value: serde_json::Value) -> CallFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn arena_is_pre_order() {
        let trace = CallTrace::try_from(frame(json!({
            "type": "CALL",
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "value": "0x0",
            "gas": "0x30d40",
            "gasUsed": "0x5208",
            "input": "0x",
            "calls": [
                {
                    "type": "STATICCALL",
                    "from": "0x0000000000000000000000000000000000000002",
                    "to": "0x0000000000000000000000000000000000000003",
                    "gas": "0x0",
                    "gasUsed": "0x0",
                    "input": "0x",
                    "calls": [{
                        "type": "SELFDESTRUCT",
                        "from": "0x0000000000000000000000000000000000000003",
                        "to": "0x0000000000000000000000000000000000000004",
                        "gas": "0x0",
                        "gasUsed": "0x0",
                        "input": "0x",
                        "value": "0x10"
                    }]
                },
                {
                    "type": "CREATE2",
                    "from": "0x0000000000000000000000000000000000000002",
                    "to": "0x0000000000000000000000000000000000000005",
                    "gas": "0x0",
                    "gasUsed": "0x0",
                    "input": "0x",
                    "value": "0x1",
                    "error": "execution reverted"
                }
            ]
        })))
        .unwrap();

        let kinds = trace.nodes().iter().map(|it| it.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                CallKind::Call,
                CallKind::StaticCall,
                CallKind::SelfDestruct,
                CallKind::Create2
            ]
        );
        assert_eq!(trace.root().children, [1, 3]);
        assert_eq!(trace.nodes()[2].parent, Some(1));
        assert_eq!(trace.nodes()[2].value, U256::from(16));
        assert_eq!(trace.root().gas_used, 21_000);
        assert_eq!(trace.nodes()[3].error.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn frame_kinds() {
        assert_eq!(CallKind::parse("SUICIDE"), Some(CallKind::SelfDestruct));
        assert_eq!(CallKind::DelegateCall.operation_type(), None);
        assert_eq!(CallKind::CallCode.operation_type(), None);
        assert_eq!(
            CallKind::SelfDestruct.operation_type(),
            Some(OperationType::Destruct)
        );

        let unknown = frame(json!({
            "type": "BLAH",
            "from": "0x0000000000000000000000000000000000000001",
            "gas": "0x0",
            "gasUsed": "0x0",
            "input": "0x"
        }));
        assert!(matches!(
            CallTrace::try_from(unknown),
            Err(DecodeError::UnknownFrameKind(kind)) if kind == "BLAH"
        ));
    }
}
