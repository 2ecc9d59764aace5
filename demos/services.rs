#![allow(dead_code)]

//! Business services shared by the demo server and client.

use network_rpc::error::{Result, RpcError};
use network_rpc::protocol::dispatcher::{MethodSet, RpcService};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Args {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArithResult {
    pub value: i64,
}

/// Integer arithmetic
pub struct ArithService;

impl ArithService {
    fn add(&self, args: Args, result: &mut ArithResult) -> Result<()> {
        result.value = args.a + args.b;
        Ok(())
    }

    fn sub(&self, args: Args, result: &mut ArithResult) -> Result<()> {
        result.value = args.a - args.b;
        Ok(())
    }

    fn mul(&self, args: Args, result: &mut ArithResult) -> Result<()> {
        result.value = args.a * args.b;
        Ok(())
    }

    fn div(&self, args: Args, result: &mut ArithResult) -> Result<()> {
        if args.b == 0 {
            return Err(RpcError::Application("division by zero".to_string()));
        }
        result.value = args.a / args.b;
        Ok(())
    }
}

impl RpcService for ArithService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Add", Self::add)
            .method("Sub", Self::sub)
            .method("Mul", Self::mul)
            .method("Div", Self::div);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoArgs {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoResult {
    pub message: String,
}

pub struct EchoService;

impl RpcService for EchoService {
    fn methods(set: &mut MethodSet<Self>) {
        set.method("Echo", |_: &EchoService, args: EchoArgs, result: &mut EchoResult| {
            result.message = format!("Echo: {}", args.message);
            Ok(())
        });
    }
}
