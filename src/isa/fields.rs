//! Field-name → type tables for the external-constant reads.
//!
//! Static data only; unknown fields fall back to `any` at the call site.

use crate::ir::Type;

pub fn txn_field_type(name: &str) -> Option<Type> {
    Some(match name {
        "Sender" | "Receiver" | "CloseRemainderTo" | "Note" | "Lease" | "VotePK"
        | "SelectionPK" | "StateProofPK" | "RekeyTo" | "AssetSender" | "AssetReceiver"
        | "AssetCloseTo" | "TxID" | "ApprovalProgram" | "ClearStateProgram" | "ConfigAssetName"
        | "ConfigAssetUnitName" | "ConfigAssetURL" | "ConfigAssetMetadataHash"
        | "ConfigAssetManager" | "ConfigAssetReserve" | "ConfigAssetFreeze"
        | "ConfigAssetClawback" | "FreezeAssetAccount" | "LastLog" | "Type" => Type::Bytes,
        "Fee" | "FirstValid" | "LastValid" | "Amount" | "TypeEnum" | "XferAsset"
        | "AssetAmount" | "GroupIndex" | "ApplicationID" | "OnCompletion" | "NumAppArgs"
        | "NumAccounts" | "NumAssets" | "NumApplications" | "NumLogs" | "ConfigAsset"
        | "ConfigAssetTotal" | "ConfigAssetDecimals" | "ConfigAssetDefaultFrozen"
        | "FreezeAsset" | "FreezeAssetFrozen" | "CreatedAssetID" | "CreatedApplicationID"
        | "GlobalNumUint" | "GlobalNumByteSlice" | "LocalNumUint" | "LocalNumByteSlice"
        | "ExtraProgramPages" | "Nonparticipation" | "VoteFirst" | "VoteLast"
        | "VoteKeyDilution" => Type::Uint64,
        _ => return None,
    })
}

pub fn txna_field_type(name: &str) -> Option<Type> {
    Some(match name {
        "ApplicationArgs" | "Accounts" | "Logs" | "ApprovalProgramPages"
        | "ClearStateProgramPages" => Type::Bytes,
        "Assets" | "Applications" => Type::Uint64,
        _ => return None,
    })
}

pub fn global_field_type(name: &str) -> Option<Type> {
    Some(match name {
        "ZeroAddress" | "CreatorAddress" | "CurrentApplicationAddress" | "GroupID"
        | "CallerApplicationAddress" => Type::Bytes,
        "MinTxnFee" | "MinBalance" | "MaxTxnLife" | "GroupSize" | "LogicSigVersion" | "Round"
        | "LatestTimestamp" | "CurrentApplicationID" | "OpcodeBudget"
        | "CallerApplicationID" => Type::Uint64,
        _ => return None,
    })
}

pub fn asset_holding_field_type(name: &str) -> Option<Type> {
    Some(match name {
        "AssetBalance" | "AssetFrozen" => Type::Uint64,
        _ => return None,
    })
}

pub fn block_field_type(name: &str) -> Option<Type> {
    Some(match name {
        "BlkSeed" => Type::Bytes,
        "BlkTimestamp" => Type::Uint64,
        _ => return None,
    })
}
