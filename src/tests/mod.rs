mod test_example_patches;
