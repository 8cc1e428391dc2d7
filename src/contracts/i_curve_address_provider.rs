use ethers::prelude::*;

abigen!(
    ICurveAddressProvider,
    r#"[
        function get_registry() external view returns (address)
        function get_address(uint256 id) external view returns (address)
    ]"#
);
