use ethers::prelude::*;

abigen!(
    Erc20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
        function symbol() external view returns (string)
        function name() external view returns (string)
        function decimals() external view returns (uint8)
    ]"#
);
