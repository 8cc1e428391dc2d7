use ethers::prelude::*;

// Union of the read surface across Curve pool generations. Any given pool
// exposes a subset; absent functions revert and are classified by the reader.
abigen!(
    ICurvePool,
    r#"[
        function minter() external view returns (address)
        function coins(uint256 i) external view returns (address)
        function balances(uint256 i) external view returns (uint256)
        function underlying_coins(uint256 i) external view returns (address)
        function get_virtual_price() external view returns (uint256)
        function A() external view returns (uint256)
        function name() external view returns (string)
        function lp_token() external view returns (address)
        function token() external view returns (address)
    ]"#
);

// Early stable pools index coins with int128.
abigen!(
    ICurveLegacyPool,
    r#"[
        function coins(int128 i) external view returns (address)
        function balances(int128 i) external view returns (uint256)
        function underlying_coins(int128 i) external view returns (address)
    ]"#
);

abigen!(
    ICurveCryptoPool,
    r#"[
        function price_oracle() external view returns (uint256)
    ]"#
);
