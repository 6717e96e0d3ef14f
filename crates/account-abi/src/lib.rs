//! Solidity ABI bindings for the smart account protocol.
//!
//! This crate is the wire contract shared by operation submitters and the validating account.
//! It carries no logic: the [`PackedUserOperation`] layout, the [`ISmartAccount`] surface invoked
//! by the entry point and by the owner, and the [`IAccountFactory`] surface used for
//! deterministic deployment. Errors and events are generated alongside so that hard failures can
//! be rendered as revert data byte-for-byte compatible with on-chain tooling.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]
#![deny(unused_must_use)]

pub use alloy_primitives;
pub use alloy_sol_types;

use alloy_sol_types::sol;

sol! {
    /// The packed user operation as submitted to the entry point (ERC-4337 v0.7 layout).
    ///
    /// `accountGasLimits` packs `verificationGasLimit (16 bytes) | callGasLimit (16 bytes)` and
    /// `gasFees` packs `maxPriorityFeePerGas (16 bytes) | maxFeePerGas (16 bytes)`.
    #[derive(Debug, Default, PartialEq, Eq, Hash)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    /// The smart account surface.
    ///
    /// `validateUserOp`, `execute` and `executeBatch` are reserved to the entry point. Session
    /// management is reserved to the owner.
    #[sol(all_derives)]
    #[derive(Debug, PartialEq, Eq)]
    interface ISmartAccount {
        /// Validates the operation signature and pays the missing prefund to the caller.
        function validateUserOp(
            PackedUserOperation calldata userOp,
            bytes32 userOpHash,
            uint256 missingAccountFunds
        ) external returns (uint256 validationData);

        /// Performs a single call from the account.
        function execute(address dest, uint256 value, bytes calldata func) external;

        /// Performs an ordered, all-or-nothing sequence of calls from the account.
        function executeBatch(
            address[] calldata dest,
            uint256[] calldata value,
            bytes[] calldata func
        ) external;

        /// Issues a scoped, time-bounded session key.
        function createSession(
            address key,
            uint64 validAfter,
            uint64 validUntil,
            address[] calldata allowedTargets
        ) external returns (bytes32 sessionId);

        /// Permanently revokes a session key.
        function revokeSession(bytes32 sessionId) external;

        /// Returns the replay-protection nonce.
        function getNonce() external view returns (uint256);

        /// Returns the root authorizing identity.
        function owner() external view returns (address);

        /// The caller is not allowed to invoke the function.
        error Unauthorized(address caller);
        /// The account cannot cover the prefund requested by the entry point.
        error InsufficientFunds(uint256 required, uint256 available);
        /// `executeBatch` received arrays of different lengths.
        error ArrayLengthMismatch(uint256 targets, uint256 values, uint256 payloads);
        /// The operation nonce is not the account's current nonce.
        error InvalidNonce(uint256 expected, uint256 provided);
        /// The session window is empty or already over.
        error InvalidSessionWindow(uint64 validAfter, uint64 validUntil);
        /// The session key is the null identity.
        error InvalidSessionKey();
        /// No session with the given id was issued by this account.
        error SessionNotFound(bytes32 sessionId);
        /// The account has no deployed state.
        error NotDeployed(address account);
        /// The account state record could not be decoded.
        error CorruptState(address account);

        /// A session key was issued.
        event SessionCreated(
            bytes32 indexed sessionId,
            address indexed key,
            uint64 validAfter,
            uint64 validUntil
        );
        /// A session key was revoked.
        event SessionRevoked(bytes32 indexed sessionId);
    }

    /// The deterministic account factory surface.
    #[sol(all_derives)]
    #[derive(Debug, PartialEq, Eq)]
    interface IAccountFactory {
        /// Deploys (or returns the already deployed) account for `owner` and `salt`.
        function createAccount(address owner, uint256 salt) external returns (address account);

        /// Computes the account address for `owner` and `salt` without side effects.
        function getAddress(address owner, uint256 salt) external view returns (address account);

        /// The owner is the null identity.
        error InvalidOwner();

        /// A new account was materialized.
        event AccountCreated(address indexed account, address indexed owner, uint256 salt);
    }
}
