use ethers::prelude::*;

abigen!(
    ILiquidityGauge,
    r#"[
        function claimable_tokens(address addr) external returns (uint256)
        function balanceOf(address addr) external view returns (uint256)
        function working_balances(address addr) external view returns (uint256)
        function lp_token() external view returns (address)
    ]"#
);
