use ethers::prelude::*;

// Legacy pool-info contract, slot 1 of the address provider. The sixth
// output is the pool's LP token. The trailing parameter struct is static, so
// it is declared flattened; the encoding is identical.
abigen!(
    ICurvePoolInfo,
    r#"[
        function get_pool_info(address _pool) external view returns (uint256[8] balances, uint256[8] underlying_balances, uint256[8] decimals, uint256[8] underlying_decimals, uint256[8] rates, address lp_token, uint256[6] fees_and_a, address future_owner, uint256[3] ramp)
    ]"#
);
